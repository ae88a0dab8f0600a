use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HOST_DEVICE: &str = "cpu";

fn host_device() -> String {
    HOST_DEVICE.to_string()
}

/// Number of elements a shape holds, `None` if it overflows `usize`.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Dense tensor carried as a JSON object: `{"shape": [..], "data": [..], "device": ".."}`.
///
/// Data is stored flat in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    #[serde(default = "host_device")]
    pub device: String,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            shape,
            data,
            device: host_device(),
        }
    }

    pub fn filled(shape: Vec<usize>, value: f64) -> Self {
        let len = element_count(&shape).unwrap_or(0);
        Self::new(shape, vec![value; len])
    }

    pub fn is_tensor(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.contains_key("shape") && obj.contains_key("data"))
    }

    pub fn from_value(value: &Value) -> Option<Tensor> {
        if !Self::is_tensor(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }

    pub fn is_consistent(&self) -> bool {
        element_count(&self.shape) == Some(self.data.len())
    }
}
