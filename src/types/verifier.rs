use std::fmt::{self, Debug};

use anyhow::{Result, anyhow, ensure};
use serde_json::Value;

use crate::types::tensor::Tensor;
use crate::types::{TypeKey, ValueKind};

/// Shallow structural check applied to each leaf value on a port.
pub trait Verifier: Send + Sync + Debug {
    fn verify(&self, value: &Value) -> Result<()>;
}

/// Default verifier: the value's kind and the registered type's kind must be
/// related in one direction or the other.
#[derive(Debug, Clone)]
pub struct SubclassVerifier {
    key: TypeKey,
}

impl SubclassVerifier {
    pub fn new(key: TypeKey) -> Self {
        Self { key }
    }
}

impl Verifier for SubclassVerifier {
    fn verify(&self, value: &Value) -> Result<()> {
        let actual = ValueKind::of(value);
        ensure!(
            self.key.kind().is_compatible(actual),
            "Expected a {}, but got received a value ({}) of type {:?}.",
            self.key.short_name(),
            value,
            actual
        );
        Ok(())
    }
}

/// Accepts any value whose kind specializes one of the allowed kinds.
#[derive(Debug, Clone)]
pub struct TypeVerifier {
    allowed: Vec<ValueKind>,
}

impl TypeVerifier {
    pub fn new(allowed: impl IntoIterator<Item = ValueKind>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl Verifier for TypeVerifier {
    fn verify(&self, value: &Value) -> Result<()> {
        let actual = ValueKind::of(value);
        if self.allowed.iter().any(|k| actual.is_subkind_of(*k)) {
            return Ok(());
        }
        Err(anyhow!("Expected one of {:?}, got {:?}", self.allowed, actual))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnythingVerifier;

impl Verifier for AnythingVerifier {
    fn verify(&self, _value: &Value) -> Result<()> {
        Ok(())
    }
}

/// Checks rank, leading dimensions, channel count and value range of a
/// [`Tensor`]-shaped value.
#[derive(Debug, Clone, Default)]
pub struct TensorVerifier {
    pub tensor_type_name: String,
    pub allowed_ranks: Option<Vec<usize>>,
    pub allowed_dims: Option<Vec<usize>>,
    pub allowed_channels: Option<Vec<usize>>,
    pub allowed_range: Option<(f64, f64)>,
}

impl TensorVerifier {
    pub fn new(tensor_type_name: &str) -> Self {
        Self {
            tensor_type_name: tensor_type_name.to_string(),
            ..Default::default()
        }
    }

    pub fn ranks(mut self, ranks: &[usize]) -> Self {
        self.allowed_ranks = Some(ranks.to_vec());
        self
    }

    pub fn dims(mut self, dims: &[usize]) -> Self {
        self.allowed_dims = Some(dims.to_vec());
        self
    }

    pub fn channels(mut self, channels: &[usize]) -> Self {
        self.allowed_channels = Some(channels.to_vec());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.allowed_range = Some((min, max));
        self
    }
}

impl Verifier for TensorVerifier {
    fn verify(&self, value: &Value) -> Result<()> {
        let name = &self.tensor_type_name;
        let tensor = Tensor::from_value(value)
            .ok_or_else(|| anyhow!("Expected an {}, got {:?}", name, ValueKind::of(value)))?;
        ensure!(
            tensor.is_consistent(),
            "{} tensor shape {:?} does not match its {} elements",
            name,
            tensor.shape,
            tensor.data.len()
        );

        if let (Some((lo, hi)), Some(min), Some(max)) = (self.allowed_range, tensor.min(), tensor.max()) {
            ensure!(
                min >= lo && max <= hi,
                "{} tensor must have values between {} and {}, got min {} and max {}",
                name,
                lo,
                hi,
                min,
                max
            );
        }

        if let Some(ranks) = &self.allowed_ranks {
            ensure!(
                ranks.contains(&tensor.rank()),
                "{} tensor must have shape in {:?}, got {:?}",
                name,
                ranks,
                tensor.shape
            );
        }

        if let Some(dims) = &self.allowed_dims {
            for (i, dim) in dims.iter().enumerate() {
                let actual = tensor.shape.get(i).copied().unwrap_or(0);
                ensure!(
                    actual <= *dim,
                    "{} tensor dimension {} must be less than or equal to {}, got {}",
                    name,
                    i,
                    dim,
                    actual
                );
            }
        }

        if let Some(channels) = &self.allowed_channels {
            let last = tensor.shape.last().copied().unwrap_or(0);
            ensure!(
                channels.contains(&last),
                "{} tensor must have the number of channels in {:?}, got {}",
                name,
                channels,
                last
            );
        }

        Ok(())
    }
}

/// Adapts a closure into a [`Verifier`].
pub struct FnVerifier<F> {
    label: String,
    check: F,
}

impl<F> Debug for FnVerifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnVerifier").field("label", &self.label).finish()
    }
}

impl<F> Verifier for FnVerifier<F>
where
    F: Fn(&Value) -> Result<()> + Send + Sync,
{
    fn verify(&self, value: &Value) -> Result<()> {
        (self.check)(value)
    }
}

pub fn verifier_fn<F>(label: &str, check: F) -> FnVerifier<F>
where
    F: Fn(&Value) -> Result<()> + Send + Sync,
{
    FnVerifier {
        label: label.to_string(),
        check,
    }
}
