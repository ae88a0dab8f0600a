use anyhow::bail;
use easy_nodes::error::{NodeError, RegistrationError};
use easy_nodes::node::setter::{FieldAccess, FieldInfo, create_field_setter_node};
use easy_nodes::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Serialize)]
struct BlurSettings {
    radius: i64,
    sigma: f64,
    label: String,
    enabled: bool,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            radius: 3,
            sigma: 1.5,
            label: "blur".to_string(),
            enabled: true,
        }
    }
}

impl NativeType for BlurSettings {
    const KIND: ValueKind = ValueKind::Object;
}

impl FieldAccess for BlurSettings {
    fn fields(&self) -> Vec<FieldInfo> {
        vec![
            FieldInfo::of("radius", &self.radius),
            FieldInfo::of("sigma", &self.sigma),
            FieldInfo::of("label", &self.label),
            FieldInfo::of("enabled", &self.enabled),
        ]
    }

    fn set_field(&mut self, name: &str, value: Value) -> anyhow::Result<()> {
        match name {
            "radius" => self.radius = serde_json::from_value(value)?,
            "sigma" => self.sigma = serde_json::from_value(value)?,
            "label" => self.label = serde_json::from_value(value)?,
            "enabled" => self.enabled = serde_json::from_value(value)?,
            other => bail!("No field named {}", other),
        }
        Ok(())
    }
}

fn builtin_registry() -> Registry {
    Registry::new(Settings::default())
        .with_builtin_types()
        .expect("builtin types")
}

#[test]
fn test_setter_requires_registered_type() {
    let mut registry = builtin_registry();
    let err = create_field_setter_node::<BlurSettings>(&mut registry, None).unwrap_err();
    assert!(matches!(err, NodeError::Registration(RegistrationError::UnregisteredType(_))));
}

#[test]
fn test_setter_node_schema_and_call() {
    let mut registry = builtin_registry();
    registry
        .register_type(TypeRegistration::of::<BlurSettings>().name("BLUR_SETTINGS"))
        .expect("register type");

    // 1. Schema mirrors the default instance
    let descriptor = create_field_setter_node::<BlurSettings>(&mut registry, Some("Filters"))
        .expect("setter")
        .expect("open registry");
    assert_eq!(descriptor.workflow_name(), "BlurSettings");
    assert_eq!(descriptor.schema.category, "Filters");

    let host = descriptor.to_host_json();
    let required = &host["INPUT_TYPES"]["required"];
    assert_eq!(required["radius"], json!(["INT", {"default": 3, "display": "number", "forceInput": false}]));
    assert_eq!(required["sigma"][1]["min"], json!(-1_000_000.0));
    assert_eq!(required["sigma"][1]["step"], json!(0.0001));
    assert_eq!(required["label"][1]["default"], json!("blur"));
    assert_eq!(host["INPUT_TYPES"]["optional"]["enabled"][1]["default"], json!(true));
    assert_eq!(host["RETURN_TYPES"], json!(["BLUR_SETTINGS"]));

    // 2. Non-null inputs are applied to a default instance
    let mut kwargs = Map::new();
    kwargs.insert("radius".into(), json!(7));
    kwargs.insert("label".into(), Value::Null);
    let output = registry.invoke("BlurSettings", kwargs).expect("invoke");
    assert_eq!(
        output.result(),
        &[json!({"radius": 7, "sigma": 1.5, "label": "blur", "enabled": true})]
    );
}
