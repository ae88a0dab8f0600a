use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::str::FromStr;

use anyhow::{Context as AnyhowContext, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RELOAD_ON_EDIT: &str = "easy_nodes.ReloadOnEdit";
pub const RETAIN_PREVIEWS: &str = "easy_nodes.RetainPreviews";
pub const LLM_DEBUGGING: &str = "easy_nodes.llm_debugging";
pub const MAX_TRIES: &str = "easy_nodes.max_tries";
pub const VERIFY_LEVEL: &str = "easy_nodes.verify_level";

/// Key-value configuration owned by the host.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str, default: Value) -> Value;
}

/// Typed accessors over any [`ConfigSource`].
pub trait ConfigExt {
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn get_string(&self, key: &str, default: &str) -> String;
    fn get_u64(&self, key: &str, default: u64) -> u64;
}

impl<C: ConfigSource + ?Sized> ConfigExt for C {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key, Value::Bool(default)) {
            Value::Bool(b) => b,
            Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "on" | "1" | "yes"),
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key, Value::String(default.to_string())) {
            Value::String(s) => s,
            Value::Null => default.to_string(),
            other => other.to_string(),
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        match self.get(key, Value::from(default)) {
            Value::Number(n) => n.as_u64().unwrap_or(default),
            Value::String(s) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}

/// In-memory configuration, optionally loaded from a YAML mapping.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, Value>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let values: Option<HashMap<String, Value>> =
            serde_yaml::from_str(content).context("Failed to deserialize configuration YAML")?;
        Ok(Self {
            values: values.unwrap_or_default(),
        })
    }

    pub fn from_yaml_file(file_path: &str) -> Result<Self> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read configuration file from {}", file_path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load configuration from {}", file_path))
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str, default: Value) -> Value {
        self.values.get(key).cloned().unwrap_or(default)
    }
}

/// How much of a function's doc text becomes the node description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocstringMode {
    None,
    Brief,
    #[default]
    Full,
}

/// What happens when a value fails its port type's validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyLevel {
    Off,
    #[default]
    Warn,
    Fatal,
}

impl FromStr for VerifyLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(VerifyLevel::Off),
            "warn" => Ok(VerifyLevel::Warn),
            "fatal" => Ok(VerifyLevel::Fatal),
            other => Err(anyhow!("Unknown verify level: {}", other)),
        }
    }
}

impl fmt::Display for VerifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerifyLevel::Off => "off",
            VerifyLevel::Warn => "warn",
            VerifyLevel::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Start-up options, fixed for the lifetime of a [`crate::Registry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_category: String,
    pub docstring_mode: DocstringMode,
    pub verify_level: VerifyLevel,
    pub auto_move_tensors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_category: "EasyNodes".to_string(),
            docstring_mode: DocstringMode::Full,
            verify_level: VerifyLevel::Warn,
            auto_move_tensors: false,
        }
    }
}

/// Severity in effect for one call: the config key wins over the start-up setting.
pub fn effective_verify_level(config: &dyn ConfigSource, settings: &Settings) -> VerifyLevel {
    let raw = config.get_string(VERIFY_LEVEL, &settings.verify_level.to_string());
    raw.parse().unwrap_or(settings.verify_level)
}
