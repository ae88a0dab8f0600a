use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::runtime::context::CallContext;

/// A node body: receives the per-call context and the filtered arguments.
pub type NodeFn = Arc<dyn Fn(&CallContext<'_>, &Args) -> Result<Returned> + Send + Sync>;

pub fn node_fn<F>(f: F) -> NodeFn
where
    F: Fn(&CallContext<'_>, &Args) -> Result<Returned> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Keyword arguments handed to a node body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Map<String, Value>,
}

impl Args {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Deserializes a required argument.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let raw = self
            .values
            .get(name)
            .ok_or_else(|| anyhow!("Missing argument '{}'", name))?;
        serde_json::from_value(raw.clone()).map_err(|e| anyhow!("Argument '{}' has the wrong shape: {}", name, e))
    }

    /// Deserializes an argument that may be absent or null.
    pub fn opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.value(name).map(Some),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// What a node body produced. `Nothing` is "returned no value at all".
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    Nothing,
    Single(Value),
    Tuple(Vec<Value>),
}

impl Returned {
    pub fn single(value: impl Into<Value>) -> Self {
        Returned::Single(value.into())
    }

    pub fn tuple<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Returned::Tuple(values.into_iter().map(Into::into).collect())
    }

    /// Normalizes to a value list the way a single return becomes a 1-tuple.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Returned::Nothing => vec![Value::Null],
            Returned::Single(v) => vec![v],
            Returned::Tuple(vs) => vs,
        }
    }
}

impl From<Value> for Returned {
    fn from(value: Value) -> Self {
        Returned::Single(value)
    }
}
