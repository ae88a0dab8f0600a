//! Nodes that build a value of a registered type from its fields.

use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{NodeResult, RegistrationError};
use crate::node::descriptor::NodeDescriptor;
use crate::node::function::{Returned, node_fn};
use crate::node::signature::{FunctionSpec, NodeOptions};
use crate::node::widgets::{DefaultValue, NumberInput, ParamDefault, StringInput};
use crate::registry::Registry;
use crate::types::registry::TypeRegistration;
use crate::types::{Annotation, NativeType, TypeKey, ValueKind};

/// A field of a [`FieldAccess`] type with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub key: TypeKey,
    pub value: Value,
}

impl FieldInfo {
    pub fn of<V: NativeType + Serialize>(name: &str, value: &V) -> Self {
        Self {
            name: name.to_string(),
            key: TypeKey::of::<V>(),
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }
}

/// Field-level get/set by name.
pub trait FieldAccess: NativeType + Default + Serialize {
    fn fields(&self) -> Vec<FieldInfo>;

    fn set_field(&mut self, name: &str, value: Value) -> anyhow::Result<()>;
}

fn field_default(field: &FieldInfo) -> Result<ParamDefault, RegistrationError> {
    let default = match (field.key.kind(), &field.value) {
        (ValueKind::Integer, Value::Number(n)) => match n.as_i64() {
            Some(i) => DefaultValue::Number(NumberInput::new(i)),
            None => return Ok(ParamDefault::Null),
        },
        (ValueKind::Number, Value::Number(n)) => {
            let f = n.as_f64().unwrap_or_default();
            DefaultValue::Number(NumberInput::bounded(f, -1_000_000.0, 10_000_000.0)?.step(0.0001))
        }
        (ValueKind::String, Value::String(s)) => DefaultValue::String(StringInput::new(s.clone())),
        (ValueKind::Bool, Value::Bool(b)) => DefaultValue::Bool(*b),
        _ => return Ok(ParamDefault::Null),
    };
    Ok(ParamDefault::Value(default))
}

/// Registers a node named after `T` whose inputs are `T`'s fields, defaulted
/// from `T::default()`. The node returns a default `T` with every non-null
/// input applied.
pub fn create_field_setter_node<T: FieldAccess>(
    registry: &mut Registry,
    category: Option<&str>,
) -> NodeResult<Option<Arc<NodeDescriptor>>> {
    let key = TypeKey::of::<T>();
    if !registry.types().is_registered(&key) {
        return Err(RegistrationError::UnregisteredType(key.path().to_string()).into());
    }
    let type_name = key.short_name().to_string();
    let module = key
        .path()
        .rsplit_once("::")
        .map(|(m, _)| m.to_string())
        .unwrap_or_default();

    let template = T::default();
    let fields = template.fields();
    let mut spec = FunctionSpec::new(&module, &format!("{}_setter", type_name)).returns(Annotation::of::<T>());
    for field in &fields {
        debug!(field = %field.name, ty = %field.key, "Setter field");
        registry.register_type(TypeRegistration::new(field.key.clone()).name(field.key.path()).auto_register())?;
        spec = spec.with_default(&field.name, Annotation::Type(field.key.clone()), field_default(field)?);
    }
    let source = serde_json::to_string(&template).unwrap_or_default();
    spec = spec.source(&source);

    let mut options = NodeOptions::new().display_name(&type_name).workflow_name(&type_name);
    if let Some(category) = category {
        options = options.category(category);
    }

    let implementation = node_fn(|_ctx, args| {
        let mut value = T::default();
        for (name, arg) in args.iter() {
            if arg.is_null() {
                continue;
            }
            value
                .set_field(name, arg.clone())
                .map_err(|e| anyhow!("Failed to set field '{}': {}", name, e))?;
        }
        Ok(Returned::single(serde_json::to_value(&value)?))
    });

    registry.register_node(spec, options, implementation)
}
