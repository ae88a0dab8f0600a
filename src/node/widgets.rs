//! Widget defaults: parameter defaults decorated with editor hints.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::RegistrationError;

/// Integer or float, kept distinct so integer defaults stay integers on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            Numeric::Int(i) => Value::from(i),
            Numeric::Float(f) => Value::from(f),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(i) => write!(f, "{}", i),
            Numeric::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for Numeric {
    fn from(v: i64) -> Self {
        Numeric::Int(v)
    }
}

impl From<i32> for Numeric {
    fn from(v: i32) -> Self {
        Numeric::Int(v as i64)
    }
}

impl From<f64> for Numeric {
    fn from(v: f64) -> Self {
        Numeric::Float(v)
    }
}

impl From<f32> for Numeric {
    fn from(v: f32) -> Self {
        Numeric::Float(v as f64)
    }
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Numeric::Int(i) => serializer.serialize_i64(*i),
            Numeric::Float(f) => serializer.serialize_f64(*f),
        }
    }
}

/// Text widget.
#[derive(Debug, Clone, PartialEq)]
pub struct StringInput {
    pub value: String,
    pub multiline: bool,
    pub force_input: bool,
    pub optional: bool,
    pub hidden: bool,
}

impl StringInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            multiline: false,
            force_input: false,
            optional: false,
            hidden: false,
        }
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn to_descriptor(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("default".into(), json!(self.value));
        map.insert("multiline".into(), json!(self.multiline));
        map.insert("display".into(), json!("input"));
        map.insert("forceInput".into(), json!(self.force_input));
        map
    }
}

/// Numeric widget. The default is checked against `[min, max]` when built.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberInput {
    pub default: Numeric,
    pub min: Option<Numeric>,
    pub max: Option<Numeric>,
    pub step: Option<Numeric>,
    pub round: Option<Numeric>,
    pub display: String,
    pub optional: bool,
    pub hidden: bool,
    pub force_input: bool,
}

impl NumberInput {
    pub fn new(default: impl Into<Numeric>) -> Self {
        Self {
            default: default.into(),
            min: None,
            max: None,
            step: None,
            round: None,
            display: "number".to_string(),
            optional: false,
            hidden: false,
            force_input: false,
        }
    }

    pub fn range(
        default: impl Into<Numeric>,
        min: Option<Numeric>,
        max: Option<Numeric>,
    ) -> Result<Self, RegistrationError> {
        let mut input = Self::new(default);
        let value = input.default.as_f64();
        if !value.is_finite() {
            return Err(RegistrationError::NonFiniteDefault(value));
        }
        if let Some(min) = min {
            if value < min.as_f64() {
                return Err(RegistrationError::BelowMinimum {
                    value,
                    min: min.as_f64(),
                });
            }
        }
        if let Some(max) = max {
            if value > max.as_f64() {
                return Err(RegistrationError::AboveMaximum {
                    value,
                    max: max.as_f64(),
                });
            }
        }
        input.min = min;
        input.max = max;
        Ok(input)
    }

    pub fn bounded(
        default: impl Into<Numeric>,
        min: impl Into<Numeric>,
        max: impl Into<Numeric>,
    ) -> Result<Self, RegistrationError> {
        Self::range(default, Some(min.into()), Some(max.into()))
    }

    pub fn step(mut self, step: impl Into<Numeric>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn round(mut self, round: impl Into<Numeric>) -> Self {
        self.round = Some(round.into());
        self
    }

    pub fn display(mut self, display: &str) -> Self {
        self.display = display.to_string();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }

    /// Only the fields that are set.
    pub fn to_descriptor(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("default".into(), self.default.to_value());
        map.insert("display".into(), json!(self.display));
        let bounds = [("min", self.min), ("max", self.max), ("step", self.step), ("round", self.round)];
        for (name, value) in bounds {
            if let Some(v) = value {
                map.insert(name.into(), v.to_value());
            }
        }
        map.insert("forceInput".into(), json!(self.force_input));
        map
    }
}

/// Enum widget: an ordered list whose first entry is the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    choices: Vec<String>,
}

impl Choice {
    pub fn new<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Result<Self, RegistrationError> {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        if choices.is_empty() {
            return Err(RegistrationError::EmptyChoice);
        }
        Ok(Self { choices })
    }

    pub fn default_value(&self) -> &str {
        &self.choices[0]
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }
}

/// Serializes as a bare list, which the editor reads as "enum widget".
impl Serialize for Choice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.choices.serialize(serializer)
    }
}

/// A concrete default value as the author wrote it.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    String(StringInput),
    Number(NumberInput),
    Choice(Choice),
}

impl DefaultValue {
    /// Promotes plain strings and numbers to widgets with default settings.
    pub fn promote(self) -> DefaultValue {
        match self {
            DefaultValue::Str(s) => DefaultValue::String(StringInput::new(s)),
            DefaultValue::Int(i) => DefaultValue::Number(NumberInput::new(i)),
            DefaultValue::Float(f) => DefaultValue::Number(NumberInput::new(f)),
            other => other,
        }
    }

    /// The value the editor starts the widget at.
    pub fn to_value(&self) -> Value {
        match self {
            DefaultValue::Str(s) => json!(s),
            DefaultValue::Int(i) => json!(i),
            DefaultValue::Float(f) => json!(f),
            DefaultValue::Bool(b) => json!(b),
            DefaultValue::Json(v) => v.clone(),
            DefaultValue::String(w) => json!(w.value),
            DefaultValue::Number(w) => w.default.to_value(),
            DefaultValue::Choice(c) => json!(c.default_value()),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        DefaultValue::Str(v.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(v: String) -> Self {
        DefaultValue::Str(v)
    }
}

impl From<i64> for DefaultValue {
    fn from(v: i64) -> Self {
        DefaultValue::Int(v)
    }
}

impl From<i32> for DefaultValue {
    fn from(v: i32) -> Self {
        DefaultValue::Int(v as i64)
    }
}

impl From<f64> for DefaultValue {
    fn from(v: f64) -> Self {
        DefaultValue::Float(v)
    }
}

impl From<bool> for DefaultValue {
    fn from(v: bool) -> Self {
        DefaultValue::Bool(v)
    }
}

impl From<Value> for DefaultValue {
    fn from(v: Value) -> Self {
        DefaultValue::Json(v)
    }
}

impl From<StringInput> for DefaultValue {
    fn from(v: StringInput) -> Self {
        DefaultValue::String(v)
    }
}

impl From<NumberInput> for DefaultValue {
    fn from(v: NumberInput) -> Self {
        DefaultValue::Number(v)
    }
}

impl From<Choice> for DefaultValue {
    fn from(v: Choice) -> Self {
        DefaultValue::Choice(v)
    }
}

/// Whether a parameter has no default, an explicit null default, or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDefault {
    Absent,
    Null,
    Value(DefaultValue),
}

impl ParamDefault {
    pub fn value(v: impl Into<DefaultValue>) -> Self {
        ParamDefault::Value(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_descriptor_omits_unset_fields() {
        let desc = NumberInput::new(3).to_descriptor();
        assert_eq!(desc.get("default"), Some(&json!(3)));
        assert!(!desc.contains_key("min"));
        assert!(!desc.contains_key("step"));
        assert_eq!(desc.get("forceInput"), Some(&json!(false)));
    }

    #[test]
    fn test_promote_plain_defaults() {
        assert!(matches!(DefaultValue::from("hi").promote(), DefaultValue::String(_)));
        assert!(matches!(DefaultValue::from(2.5).promote(), DefaultValue::Number(_)));
        assert!(matches!(DefaultValue::from(true).promote(), DefaultValue::Bool(true)));
    }
}
