//! Port types: the mapping from Rust-side value types to the names the graph
//! editor uses to decide which sockets can be wired together.

pub mod builtin;
pub mod registry;
pub mod tensor;
pub mod verifier;

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Runtime values flowing between nodes.
pub type NodeValue = Value;

/// Runtime shape of a value, ordered by specialization:
/// `Bool` < `Integer` < `Number` < `Any`, and `String`/`Array`/`Object` < `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum ValueKind {
    Any,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> ValueKind {
        match value {
            Value::Null => ValueKind::Any,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_f64() => ValueKind::Number,
            Value::Number(_) => ValueKind::Integer,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    fn parent(self) -> Option<ValueKind> {
        match self {
            ValueKind::Any => None,
            ValueKind::Bool => Some(ValueKind::Integer),
            ValueKind::Integer => Some(ValueKind::Number),
            _ => Some(ValueKind::Any),
        }
    }

    /// True when `self` is `other` or a specialization of it.
    pub fn is_subkind_of(self, other: ValueKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Compatible if either kind specializes the other.
    pub fn is_compatible(self, other: ValueKind) -> bool {
        self.is_subkind_of(other) || other.is_subkind_of(self)
    }

    /// Coerces a scalar value into this kind.
    pub fn convert(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ValueKind::String, Value::String(s)) => Ok(Value::String(s)),
            (ValueKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
            (ValueKind::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (ValueKind::Number, Value::Number(n)) => n
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("cannot represent {} as a float", n)),
            (ValueKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|e| format!("cannot parse '{}' as a float: {}", s, e)),
            (ValueKind::Integer, Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Value::from(i)),
                (None, Some(f)) if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(format!("cannot represent {} as an integer", n)),
            },
            (ValueKind::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| format!("cannot parse '{}' as an integer: {}", s, e)),
            (ValueKind::Bool, Value::Number(n)) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            (_, other) => Ok(other),
        }
    }
}

/// Rust types that can be named in a node signature.
pub trait NativeType: 'static {
    const KIND: ValueKind;
}

macro_rules! native {
    ($kind:expr => $($t:ty),+) => {
        $(impl NativeType for $t { const KIND: ValueKind = $kind; })+
    };
}

native!(ValueKind::Integer => i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
native!(ValueKind::Number => f32, f64);
native!(ValueKind::String => String, &'static str);
native!(ValueKind::Bool => bool);
native!(ValueKind::Any => Value);

/// Fully qualified identity of a native type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    path: String,
    kind: ValueKind,
}

impl TypeKey {
    pub fn of<T: NativeType>() -> Self {
        Self {
            path: std::any::type_name::<T>().to_string(),
            kind: T::KIND,
        }
    }

    /// A type known only by name, e.g. one declared in a module file.
    pub fn named(path: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Last path segment with generic arguments stripped.
    pub fn short_name(&self) -> &str {
        let base = self.path.split('<').next().unwrap_or(&self.path);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Empty,
    Type(TypeKey),
    List(Box<Annotation>),
    Tuple(Vec<Annotation>),
}

impl Annotation {
    pub fn of<T: NativeType>() -> Self {
        Annotation::Type(TypeKey::of::<T>())
    }

    pub fn list_of<T: NativeType>() -> Self {
        Annotation::List(Box::new(Annotation::of::<T>()))
    }

    pub fn list(inner: Annotation) -> Self {
        Annotation::List(Box::new(inner))
    }

    pub fn tuple(items: impl IntoIterator<Item = Annotation>) -> Self {
        Annotation::Tuple(items.into_iter().collect())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Annotation::List(_))
    }

    pub fn type_key(&self) -> Option<&TypeKey> {
        match self {
            Annotation::Type(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Empty => f.write_str("<empty>"),
            Annotation::Type(key) => write!(f, "{}", key),
            Annotation::List(inner) => write!(f, "list[{}]", inner),
            Annotation::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|a| a.to_string()).collect();
                write!(f, "tuple[{}]", parts.join(", "))
            }
        }
    }
}

pub const WILDCARD: &str = "*";

/// Declared port type of a socket as the editor sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortType {
    Named(String),
    /// Matches every other port type.
    Any,
    /// Enum widget; the first entry is the default.
    Choice(Vec<String>),
}

impl PortType {
    pub fn named(name: impl Into<String>) -> Self {
        PortType::Named(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            PortType::Named(name) => Some(name),
            PortType::Any => Some(WILDCARD),
            PortType::Choice(_) => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, PortType::Choice(_))
    }

    /// Whether a connection between the two port types is allowed.
    pub fn accepts(&self, other: &PortType) -> bool {
        match (self, other) {
            (PortType::Any, _) | (_, PortType::Any) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortType::Named(name) => f.write_str(name),
            PortType::Any => f.write_str(WILDCARD),
            PortType::Choice(choices) => write!(f, "{:?}", choices),
        }
    }
}

impl Serialize for PortType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PortType::Named(name) => serializer.serialize_str(name),
            PortType::Any => serializer.serialize_str(WILDCARD),
            PortType::Choice(choices) => choices.serialize(serializer),
        }
    }
}
