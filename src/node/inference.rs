//! Derives a node's port schema from a [`FunctionSpec`].

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::RegistrationError;
use crate::node::signature::{FunctionSpec, Param};
use crate::node::widgets::{DefaultValue, ParamDefault};
use crate::types::registry::TypeRegistry;
use crate::types::{Annotation, PortType};

/// Parameter names the host injects on every call.
pub const UNIQUE_ID: &str = "unique_id";
pub const EXTRA_PNGINFO: &str = "extra_pnginfo";

pub const UNIQUE_ID_TYPE: &str = "UNIQUE_ID";
pub const EXTRA_PNGINFO_TYPE: &str = "EXTRA_PNGINFO";

pub fn is_reserved(name: &str) -> bool {
    name == UNIQUE_ID || name == EXTRA_PNGINFO
}

/// A port's type plus its widget metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub port_type: PortType,
    pub metadata: Option<Map<String, Value>>,
}

impl PortSpec {
    pub fn new(port_type: PortType, metadata: Map<String, Value>) -> Self {
        Self {
            port_type,
            metadata: Some(metadata),
        }
    }

    /// Host-reserved port, serialized as a bare type name.
    pub fn reserved(port_type: &str) -> Self {
        Self {
            port_type: PortType::named(port_type),
            metadata: None,
        }
    }

    pub fn choice(choices: Vec<String>) -> Self {
        Self {
            port_type: PortType::Choice(choices),
            metadata: None,
        }
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

impl Serialize for PortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (&self.port_type, &self.metadata) {
            (PortType::Named(name), None) => serializer.serialize_str(name),
            (port_type, metadata) => {
                let mut seq = serializer.serialize_seq(None)?;
                seq.serialize_element(port_type)?;
                if let Some(metadata) = metadata {
                    seq.serialize_element(metadata)?;
                }
                seq.end()
            }
        }
    }
}

/// Ports in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortMap {
    entries: Vec<(String, PortSpec)>,
}

impl PortMap {
    pub fn insert(&mut self, name: &str, spec: PortSpec) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((name.to_string(), spec)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PortSpec> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PortSpec)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PortMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, spec) in &self.entries {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

/// The `{required, hidden, optional}` shape the host asks for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSchema {
    pub required: PortMap,
    pub hidden: PortMap,
    pub optional: PortMap,
}

impl Default for InputSchema {
    fn default() -> Self {
        let mut hidden = PortMap::default();
        hidden.insert(UNIQUE_ID, PortSpec::reserved(UNIQUE_ID_TYPE));
        hidden.insert(EXTRA_PNGINFO, PortSpec::reserved(EXTRA_PNGINFO_TYPE));
        Self {
            required: PortMap::default(),
            hidden,
            optional: PortMap::default(),
        }
    }
}

impl InputSchema {
    /// Looks a visible (required or optional) port up by name.
    pub fn visible(&self, name: &str) -> Option<&PortSpec> {
        self.required.get(name).or_else(|| self.optional.get(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferredInputs {
    pub schema: InputSchema,
    pub is_list: BTreeMap<String, bool>,
}

impl InferredInputs {
    pub fn any_list(&self) -> bool {
        self.is_list.values().any(|v| *v)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferredOutputs {
    pub types: Vec<PortType>,
    pub is_list: Vec<bool>,
}

impl InferredOutputs {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

enum Placement {
    Required,
    Optional,
    Hidden,
}

fn annotate_input(param: &Param, types: &TypeRegistry) -> Result<(PortSpec, Placement), RegistrationError> {
    let port_type = types.resolve(&param.annotation)?;

    let default = match &param.default {
        ParamDefault::Value(DefaultValue::Choice(choice)) => {
            return Ok((PortSpec::choice(choice.choices().to_vec()), Placement::Required));
        }
        ParamDefault::Value(v) => ParamDefault::Value(v.clone().promote()),
        other => other.clone(),
    };

    let widget = match &default {
        ParamDefault::Value(DefaultValue::String(w)) => Some((w.to_descriptor(), w.optional, w.hidden)),
        ParamDefault::Value(DefaultValue::Number(w)) => Some((w.to_descriptor(), w.optional, w.hidden)),
        _ => None,
    };
    if let Some((metadata, optional, hidden)) = widget {
        let placement = match (optional, hidden) {
            (false, _) => Placement::Required,
            (true, true) => Placement::Hidden,
            (true, false) => Placement::Optional,
        };
        return Ok((PortSpec::new(port_type, metadata), placement));
    }

    let mut metadata = Map::new();
    let placement = match &default {
        ParamDefault::Null => {
            metadata.insert("optional".into(), json!(true));
            metadata.insert("forceInput".into(), json!(true));
            Placement::Optional
        }
        ParamDefault::Absent => {
            metadata.insert("forceInput".into(), json!(true));
            Placement::Required
        }
        ParamDefault::Value(v) => {
            metadata.insert("default".into(), v.to_value());
            Placement::Optional
        }
    };

    // Some types are almost always wired rather than typed in, even with a default.
    if types.force_input(&param.annotation) {
        metadata.insert("forceInput".into(), json!(true));
    }

    Ok((PortSpec::new(port_type, metadata), placement))
}

/// Classifies every parameter into required, optional or hidden ports.
pub fn infer_inputs(spec: &FunctionSpec, types: &TypeRegistry) -> Result<InferredInputs, RegistrationError> {
    let mut inferred = InferredInputs::default();

    let params = if spec.skips_first_param() {
        spec.params.get(1..).unwrap_or(&[])
    } else {
        &spec.params[..]
    };

    for param in params {
        inferred.is_list.insert(param.name.clone(), param.annotation.is_list());

        let (port, placement) = annotate_input(param, types)?;
        if is_reserved(&param.name) {
            continue;
        }
        match placement {
            Placement::Required => inferred.schema.required.insert(&param.name, port),
            Placement::Hidden => inferred.schema.hidden.insert(&param.name, port),
            Placement::Optional => inferred.schema.optional.insert(&param.name, port),
        }
    }

    debug!(
        function = %spec.path(),
        required = inferred.schema.required.len(),
        optional = inferred.schema.optional.len(),
        "Inferred inputs"
    );
    Ok(inferred)
}

fn push_output(outputs: &mut InferredOutputs, annotation: &Annotation, types: &TypeRegistry) -> Result<(), RegistrationError> {
    match annotation {
        Annotation::List(inner) => {
            outputs.types.push(types.resolve(inner)?);
            outputs.is_list.push(true);
        }
        other => {
            outputs.types.push(types.resolve(other)?);
            outputs.is_list.push(false);
        }
    }
    Ok(())
}

/// Output ports from a return annotation. No annotation means no outputs.
pub fn infer_outputs(returns: &Annotation, types: &TypeRegistry) -> Result<InferredOutputs, RegistrationError> {
    let mut outputs = InferredOutputs::default();
    match returns {
        Annotation::Empty => {}
        Annotation::Tuple(items) => {
            for item in items {
                push_output(&mut outputs, item, types)?;
            }
        }
        single => push_output(&mut outputs, single, types)?,
    }
    Ok(outputs)
}

/// Output ports from an explicit list of return types; each entry is one output.
pub fn infer_explicit_outputs(return_types: &[Annotation], types: &TypeRegistry) -> Result<InferredOutputs, RegistrationError> {
    let mut outputs = InferredOutputs::default();
    for item in return_types {
        push_output(&mut outputs, item, types)?;
    }
    Ok(outputs)
}
