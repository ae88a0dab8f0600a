//! Nodes defined in YAML, with outputs computed by `evalexpr` expressions over
//! the inputs. Editing the file while the host runs swaps node behaviour in
//! place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use evalexpr::{ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, eval_with_context};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::node::function::{Args, NodeFn, Returned, node_fn};
use crate::node::signature::{FunctionSpec, NodeOptions};
use crate::node::widgets::{Choice, DefaultValue, NumberInput, Numeric, ParamDefault, StringInput};
use crate::registry::Registry;
use crate::runtime::live::{FunctionSource, ModuleContents, NodeModule};
use crate::types::registry::TypeRegistry;
use crate::types::{Annotation, WILDCARD};

/// Keeps `default: null` distinct from a missing `default`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub port: Option<String>,
    #[serde(default)]
    pub list: bool,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub min: Option<Value>,
    #[serde(default)]
    pub max: Option<Value>,
    #[serde(default)]
    pub step: Option<Value>,
    #[serde(default)]
    pub multiline: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub force_input: bool,
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub port: Option<String>,
    #[serde(default)]
    pub list: bool,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
    #[serde(default)]
    pub outputs: Vec<OutputDef>,
    /// Expression whose value is shown as preview text.
    #[serde(default)]
    pub show: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub output_node: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFile {
    pub module: String,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

impl ModuleFile {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read module file from {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to deserialize module file {}", path.display()))
    }
}

fn to_expr_value(value: &Value) -> Option<evalexpr::Value> {
    match value {
        Value::String(s) => Some(evalexpr::Value::String(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(evalexpr::Value::Int(i)),
            None => n.as_f64().map(evalexpr::Value::Float),
        },
        Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
        Value::Array(items) => items
            .iter()
            .map(to_expr_value)
            .collect::<Option<Vec<_>>>()
            .map(evalexpr::Value::Tuple),
        Value::Null => Some(evalexpr::Value::Empty),
        Value::Object(_) => None,
    }
}

fn to_json(value: evalexpr::Value) -> Value {
    match value {
        evalexpr::Value::String(s) => Value::String(s),
        evalexpr::Value::Int(i) => json!(i),
        evalexpr::Value::Float(f) => json!(f),
        evalexpr::Value::Boolean(b) => Value::Bool(b),
        evalexpr::Value::Tuple(items) => Value::Array(items.into_iter().map(to_json).collect()),
        evalexpr::Value::Empty => Value::Null,
    }
}

fn eval_context(args: &Args) -> Result<HashMapContext<DefaultNumericTypes>> {
    let mut ctx = HashMapContext::<DefaultNumericTypes>::new();
    for (name, value) in args.iter() {
        if let Some(v) = to_expr_value(value) {
            ctx.set_value(name.clone(), v)
                .map_err(|e| anyhow!("Cannot bind '{}': {}", name, e))?;
        }
    }
    Ok(ctx)
}

fn evaluate(expr: &str, ctx: &HashMapContext<DefaultNumericTypes>) -> Result<Value> {
    eval_with_context(expr, ctx)
        .map(to_json)
        .map_err(|e| anyhow!("Expression evaluation failed: {} -> {}", expr, e))
}

fn implementation(node: Arc<NodeDef>) -> NodeFn {
    node_fn(move |ctx, args| {
        let eval_ctx = eval_context(args)?;
        if let Some(show) = &node.show {
            match evaluate(show, &eval_ctx)? {
                Value::String(s) => ctx.show_text(s),
                other => ctx.show_text(other.to_string()),
            }
        }
        let mut values = node
            .outputs
            .iter()
            .map(|output| evaluate(&output.expr, &eval_ctx).with_context(|| format!("Output '{}'", output.name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(match values.len() {
            0 => Returned::Nothing,
            1 => Returned::Single(values.remove(0)),
            _ => Returned::Tuple(values),
        })
    })
}

fn fingerprint_source(node: &NodeDef) -> String {
    serde_json::to_string(node).unwrap_or_else(|_| node.name.clone())
}

fn numeric(value: &Value) -> Option<Numeric> {
    let n = value.as_number()?;
    match n.as_i64() {
        Some(i) => Some(Numeric::Int(i)),
        None => n.as_f64().map(Numeric::Float),
    }
}

fn bound(input: &InputDef, field: &str, value: Option<&Value>) -> Result<Option<Numeric>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => numeric(v)
            .map(Some)
            .ok_or_else(|| anyhow!("'{}' of input '{}' must be a number, got {}", field, input.name, v)),
    }
}

fn annotation(port: Option<&str>, list: bool, types: &TypeRegistry) -> Result<Annotation> {
    let inner = match port {
        None | Some(WILDCARD) => Annotation::Empty,
        Some(name) => {
            let key = types
                .canonical_key(name)
                .ok_or_else(|| anyhow!("Type '{}' not registered", name))?;
            Annotation::Type(key.clone())
        }
    };
    Ok(if list { Annotation::list(inner) } else { inner })
}

fn param_default(input: &InputDef) -> Result<ParamDefault> {
    if !input.choices.is_empty() {
        return Ok(ParamDefault::value(Choice::new(input.choices.clone())?));
    }
    let default = match &input.default {
        None => return Ok(ParamDefault::Absent),
        Some(Value::Null) => return Ok(ParamDefault::Null),
        Some(value) => value,
    };
    let widget = match default {
        Value::Number(_) => {
            let value = numeric(default).ok_or_else(|| anyhow!("Invalid number for '{}'", input.name))?;
            let min = bound(input, "min", input.min.as_ref())?;
            let max = bound(input, "max", input.max.as_ref())?;
            let mut widget = NumberInput::range(value, min, max)?;
            if let Some(step) = bound(input, "step", input.step.as_ref())? {
                widget = widget.step(step);
            }
            if input.optional {
                widget = widget.optional();
            }
            if input.force_input {
                widget = widget.force_input();
            }
            DefaultValue::Number(widget)
        }
        Value::String(s) => {
            let mut widget = StringInput::new(s.clone());
            if input.multiline {
                widget = widget.multiline();
            }
            if input.optional {
                widget = widget.optional();
            }
            if input.force_input {
                widget = widget.force_input();
            }
            DefaultValue::String(widget)
        }
        Value::Bool(b) => DefaultValue::Bool(*b),
        other => DefaultValue::Json(other.clone()),
    };
    Ok(ParamDefault::Value(widget))
}

fn line_of(content: &str, node_name: &str) -> u32 {
    content
        .lines()
        .position(|line| {
            let line = line.trim_start().trim_start_matches("- ").trim();
            line.strip_prefix("name:").is_some_and(|rest| rest.trim().trim_matches('"') == node_name)
        })
        .map(|i| i as u32 + 1)
        .unwrap_or(0)
}

/// A YAML file of expression nodes, registered under its `module` name.
#[derive(Debug, Clone)]
pub struct ExpressionModule {
    name: String,
    path: PathBuf,
}

impl ExpressionModule {
    /// Parses `path`, registers every node it defines and starts tracking the
    /// file for edits. Returns the workflow names registered.
    pub fn register(path: impl AsRef<Path>, registry: &mut Registry) -> Result<Vec<String>> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read module file from {}", path.display()))?;
        let file: ModuleFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to deserialize module file {}", path.display()))?;

        let mut registered = Vec::new();
        for node in &file.nodes {
            let spec = Self::spec_for(&file.module, node, &path, &content, registry.types())
                .with_context(|| format!("Invalid node '{}' in {}", node.name, path.display()))?;

            let mut options = NodeOptions::new()
                .return_names(node.outputs.iter().map(|o| o.name.clone()));
            if let Some(category) = &node.category {
                options = options.category(category);
            }
            if let Some(display_name) = &node.display_name {
                options = options.display_name(display_name);
            }
            if let Some(color) = &node.color {
                options = options.color(color);
            }
            if node.output_node {
                options = options.output_node();
            }

            let descriptor = registry.register_node(spec, options, implementation(Arc::new(node.clone())))?;
            if let Some(descriptor) = descriptor {
                registered.push(descriptor.workflow_name().to_string());
            }
        }

        info!(module = %file.module, nodes = registered.len(), "Registered expression module");
        registry.add_module(Arc::new(ExpressionModule {
            name: file.module,
            path,
        }));
        Ok(registered)
    }

    fn spec_for(module: &str, node: &NodeDef, path: &Path, content: &str, types: &TypeRegistry) -> Result<FunctionSpec> {
        let mut spec = FunctionSpec::new(module, &node.name)
            .located(path, line_of(content, &node.name))
            .source(&fingerprint_source(node));
        if let Some(doc) = &node.doc {
            spec = spec.doc(doc);
        }
        for input in &node.inputs {
            let ann = annotation(input.port.as_deref(), input.list, types)?;
            spec = spec.with_default(&input.name, ann, param_default(input)?);
        }
        let outputs = node
            .outputs
            .iter()
            .map(|o| annotation(o.port.as_deref(), o.list, types))
            .collect::<Result<Vec<_>>>()?;
        let returns = match outputs.len() {
            0 => Annotation::Empty,
            1 => outputs.into_iter().next().unwrap_or(Annotation::Empty),
            _ => Annotation::tuple(outputs),
        };
        Ok(spec.returns(returns))
    }
}

impl NodeModule for ExpressionModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<ModuleContents> {
        let file = ModuleFile::from_yaml_file(&self.path)?;
        let contents: HashMap<String, FunctionSource> = file
            .nodes
            .into_iter()
            .map(|node| {
                let source = fingerprint_source(&node);
                let name = node.name.clone();
                (
                    name,
                    FunctionSource {
                        implementation: implementation(Arc::new(node)),
                        source,
                    },
                )
            })
            .collect();
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_default_is_distinct_from_missing() {
        let yaml = "name: x\ndefault: null\n";
        let with_null: InputDef = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(with_null.default, Some(Value::Null));

        let missing: InputDef = serde_yaml::from_str("name: x\n").expect("parse");
        assert_eq!(missing.default, None);
    }

    #[test]
    fn test_non_numeric_bound_is_rejected() {
        let input: InputDef = serde_yaml::from_str("name: x\ndefault: 1\nmin: \"0\"\n").expect("parse");
        let err = param_default(&input).expect_err("string bound");
        assert!(err.to_string().contains("'min' of input 'x'"));

        let input: InputDef = serde_yaml::from_str("name: x\ndefault: 1\nmin: 0\nstep: 0.5\n").expect("parse");
        assert!(param_default(&input).is_ok());
    }

    #[test]
    fn test_line_of_finds_node_entry() {
        let content = "module: m\nnodes:\n  - name: first\n  - name: second\n";
        assert_eq!(line_of(content, "second"), 4);
        assert_eq!(line_of(content, "missing"), 0);
    }
}
