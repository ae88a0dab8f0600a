use serde_json::Value;
use tracing::{error, warn};

use crate::config::VerifyLevel;
use crate::error::VerificationError;
use crate::types::PortType;
use crate::types::registry::TypeRegistry;
use crate::types::verifier::Verifier;

fn verify_leaves(verifier: &dyn Verifier, value: &Value) -> anyhow::Result<()> {
    match value {
        Value::Array(items) => items.iter().try_for_each(|item| verify_leaves(verifier, item)),
        leaf => verifier.verify(leaf),
    }
}

/// Runs each value through the verifier of its declared port type.
///
/// `list_type` is `INPUT` or `OUTPUT` and only appears in messages. Choice
/// ports, null values and the wildcard are skipped. Under [`VerifyLevel::Fatal`]
/// the first failure is returned; otherwise failures are logged.
pub fn verify_values(
    types: &TypeRegistry,
    level: VerifyLevel,
    list_type: &str,
    values: &[Value],
    port_types: &[PortType],
    names: Option<&[String]>,
    origin: &str,
) -> Result<(), VerificationError> {
    if level == VerifyLevel::Off {
        return Ok(());
    }

    for (i, (value, port_type)) in values.iter().zip(port_types).enumerate() {
        if value.is_null() {
            continue;
        }
        let port_name = match port_type {
            PortType::Choice(_) | PortType::Any => continue,
            PortType::Named(name) => name,
        };
        let param_name = names
            .and_then(|n| n.get(i))
            .cloned()
            .unwrap_or_else(|| i.to_string());

        let Some(verifier) = types.verifier(port_name) else {
            warn!("No verifier for {}. Skipping verification.", port_name);
            continue;
        };

        if let Err(e) = verify_leaves(verifier.as_ref(), value) {
            let message = format!("Error verifying {} {}: {}\n{}", list_type, param_name, e, origin);
            if level == VerifyLevel::Fatal {
                error!("{}", message);
                return Err(VerificationError { message });
            }
            warn!("{}", message);
        }
    }
    Ok(())
}
