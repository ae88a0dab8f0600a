use serde_json::Value;

use crate::types::tensor::{HOST_DEVICE, Tensor};

/// Moves tensor-shaped values between host memory and a compute device.
pub trait DevicePlacement: Send + Sync {
    fn to_device(&self, value: Value) -> Value;

    fn to_host(&self, value: Value) -> Value;
}

/// No compute device: values stay where they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOnly;

impl DevicePlacement for HostOnly {
    fn to_device(&self, value: Value) -> Value {
        value
    }

    fn to_host(&self, value: Value) -> Value {
        value
    }
}

/// Relabels every tensor (including those nested in lists and objects) with
/// a device name.
#[derive(Debug, Clone)]
pub struct TensorDevice {
    device: String,
}

impl TensorDevice {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

fn relabel(value: Value, device: &str) -> Value {
    if Tensor::is_tensor(&value) {
        let Value::Object(mut map) = value else {
            return value;
        };
        map.insert("device".to_string(), Value::String(device.to_string()));
        return Value::Object(map);
    }
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(|v| relabel(v, device)).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, relabel(v, device))).collect()),
        other => other,
    }
}

impl DevicePlacement for TensorDevice {
    fn to_device(&self, value: Value) -> Value {
        relabel(value, &self.device)
    }

    fn to_host(&self, value: Value) -> Value {
        relabel(value, HOST_DEVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_tensors_are_relabelled() {
        let t = Tensor::filled(vec![1, 2], 0.5).to_value();
        let moved = TensorDevice::new("cuda:0").to_device(json!({"a": [t.clone()], "n": 1}));
        assert_eq!(moved["a"][0]["device"], json!("cuda:0"));
        assert_eq!(moved["n"], json!(1));
        let back = TensorDevice::new("cuda:0").to_host(moved);
        assert_eq!(back["a"][0]["device"], json!(HOST_DEVICE));
    }
}
