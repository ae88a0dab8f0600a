use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::RegistrationError;
use crate::node::function::Args;
use crate::node::inference::{InferredInputs, InferredOutputs, InputSchema};
use crate::node::signature::{IsChangedFn, ValidateInputsFn};
use crate::runtime::live::ImplCell;
use crate::types::PortType;

/// Marker that prefixes the description when visual hints are present.
pub const INFO_MARKER: &str = "EasyNodesInfo=";

/// Parses `#RRGGBB` into its three channels.
pub fn hex_to_color(color: &str) -> Result<[u8; 3], RegistrationError> {
    let hex = color.trim().trim_start_matches('#').trim().to_ascii_uppercase();
    let invalid = || RegistrationError::InvalidColor(color.to_string());
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// Darkened background derived from a foreground color.
pub fn derive_bg_color(rgb: [u8; 3]) -> String {
    let scaled: String = rgb
        .iter()
        .map(|c| format!("{:02X}", (f64::from(*c) * 0.6) as u8))
        .collect();
    format!("#{}", scaled)
}

/// Visual hints smuggled to the editor through the description.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "bgColor", skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(rename = "sourceLocation", skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
}

impl NodeInfo {
    /// Validates the colors and fills in a background from the foreground.
    pub fn new(
        color: Option<&str>,
        bg_color: Option<&str>,
        height: Option<u32>,
        width: Option<u32>,
        source_location: Option<String>,
    ) -> Result<Self, RegistrationError> {
        let mut bg_color = bg_color.map(str::to_string);
        if let Some(color) = color {
            let rgb = hex_to_color(color)?;
            if bg_color.as_deref().is_none_or(str::is_empty) {
                bg_color = Some(derive_bg_color(rgb));
            }
        }
        if let Some(bg) = &bg_color {
            hex_to_color(bg)?;
        }
        Ok(Self {
            color: color.map(str::to_string),
            bg_color,
            height,
            width,
            source_location,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == NodeInfo::default()
    }

    /// Prepends the `EasyNodesInfo=<json>` line when there is anything to say.
    pub fn decorate(&self, description: &str) -> String {
        if self.is_empty() {
            return description.to_string();
        }
        let info = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}\n{}", INFO_MARKER, info, description)
    }
}

/// The host-facing, serializable part of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    pub workflow_name: String,
    pub display_name: String,
    pub category: String,
    pub function: String,
    pub inputs: InferredInputs,
    pub outputs: InferredOutputs,
    pub return_names: Option<Vec<String>>,
    pub is_output_node: bool,
    pub description: String,
    pub info: NodeInfo,
}

impl NodeSchema {
    pub fn input_types(&self) -> &InputSchema {
        &self.inputs.schema
    }

    pub fn return_types(&self) -> &[PortType] {
        &self.outputs.types
    }

    pub fn input_is_list(&self) -> bool {
        self.inputs.any_list()
    }

    pub fn full_description(&self) -> String {
        self.info.decorate(&self.description)
    }
}

/// A registered node: stable identity plus a swappable implementation.
pub struct NodeDescriptor {
    pub schema: NodeSchema,
    /// Tracker identity of the wrapped function.
    pub identity: String,
    pub qualname: String,
    pub param_names: Vec<String>,
    pub source_location: String,
    pub implementation: ImplCell,
    pub validate_inputs: Option<ValidateInputsFn>,
    pub is_changed: Option<IsChangedFn>,
    pub always_run: bool,
    pub debug: bool,
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("schema", &self.schema)
            .field("identity", &self.identity)
            .field("param_names", &self.param_names)
            .field("always_run", &self.always_run)
            .finish_non_exhaustive()
    }
}

impl NodeDescriptor {
    pub fn workflow_name(&self) -> &str {
        &self.schema.workflow_name
    }

    pub fn display_name(&self) -> &str {
        &self.schema.display_name
    }

    /// `\n Source: <qualname> <file>:<line>` appended to diagnostics.
    pub fn origin(&self) -> String {
        format!("\n Source: {} {}", self.qualname, self.source_location)
    }

    /// Runs the author's input validator, if any.
    pub fn validate_inputs(&self, args: &Args) -> anyhow::Result<()> {
        match &self.validate_inputs {
            Some(validate) => validate(args),
            None => Ok(()),
        }
    }

    /// The class attributes the host reads, with unset entries omitted.
    pub fn to_host_json(&self) -> Value {
        let schema = &self.schema;
        let mut class = Map::new();
        class.insert("INPUT_TYPES".into(), json!(schema.input_types()));
        class.insert("CATEGORY".into(), json!(schema.category));
        class.insert("RETURN_TYPES".into(), json!(schema.return_types()));
        class.insert("FUNCTION".into(), json!(schema.function));
        class.insert("INPUT_IS_LIST".into(), json!(schema.input_is_list()));
        class.insert("OUTPUT_IS_LIST".into(), json!(schema.outputs.is_list));
        class.insert("OUTPUT_NODE".into(), json!(schema.is_output_node));
        if let Some(names) = &schema.return_names {
            class.insert("RETURN_NAMES".into(), json!(names));
        }
        class.insert("VALIDATE_INPUTS".into(), json!(self.validate_inputs.is_some()));
        class.insert("IS_CHANGED".into(), json!(true));
        class.insert("DESCRIPTION".into(), json!(schema.full_description()));
        Value::Object(class)
    }
}
