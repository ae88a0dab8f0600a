//! The per-call path: filter, convert and verify the host's inputs, run the
//! freshest implementation, then check and convert what it returned.

use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::{self, ConfigExt, VerifyLevel, effective_verify_level};
use crate::error::{ContractError, InvocationError, NodeError, NodeResult, VerificationError};
use crate::node::descriptor::NodeDescriptor;
use crate::node::function::{Args, NodeFn, Returned};
use crate::node::inference::UNIQUE_ID;
use crate::registry::Registry;
use crate::runtime::context::{CallContext, Preview};
use crate::runtime::live::{ChangeSignal, ChangeToken};
use crate::runtime::repair::{FailureReport, RepairMode, RepairOutcome};
use crate::runtime::verify::verify_values;
use crate::types::tensor::Tensor;
use crate::types::{PortType, ValueKind};

/// What the host receives from one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Plain(Vec<Value>),
    WithPreview { ui: Preview, result: Vec<Value> },
}

impl NodeOutput {
    pub fn result(&self) -> &[Value] {
        match self {
            NodeOutput::Plain(result) | NodeOutput::WithPreview { result, .. } => result,
        }
    }

    pub fn preview(&self) -> Option<&Preview> {
        match self {
            NodeOutput::Plain(_) => None,
            NodeOutput::WithPreview { ui, .. } => Some(ui),
        }
    }
}

impl Serialize for NodeOutput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeOutput::Plain(result) => result.serialize(serializer),
            NodeOutput::WithPreview { ui, result } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("ui", ui)?;
                map.serialize_entry("result", result)?;
                map.end()
            }
        }
    }
}

fn describe_input(name: &str, value: &Value) -> String {
    match Tensor::from_value(value) {
        Some(t) => format!(
            "{} (Tensor): shape={:?} device={} min={:?} max={:?}",
            name,
            t.shape,
            t.device,
            t.min(),
            t.max()
        ),
        None => format!("{} ({:?}): {}", name, ValueKind::of(value), value),
    }
}

fn unique_id_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.len() == 1 => unique_id_of(&items[0]),
        other => other.to_string(),
    }
}

/// Sorts a failed attempt's error back into the typed taxonomy.
fn classify(descriptor: &NodeDescriptor, cause: anyhow::Error, console: String) -> NodeError {
    let cause = match cause.downcast::<ContractError>() {
        Ok(contract) => return NodeError::Contract(contract),
        Err(other) => other,
    };
    let cause = match cause.downcast::<VerificationError>() {
        Ok(verification) => return NodeError::Verification(verification),
        Err(other) => other,
    };
    let err = InvocationError::new(&descriptor.qualname, &descriptor.source_location, cause, console);
    warn!(
        function = %err.function,
        interesting_levels = err.interesting_levels,
        "Node failed:\n{}",
        err.frames.join("\n  caused by: ")
    );
    NodeError::Invocation(err)
}

impl Registry {
    fn repair_mode(&self) -> RepairMode {
        self.config
            .get_string(config::LLM_DEBUGGING, "Off")
            .parse()
            .unwrap_or_default()
    }

    fn reload_enabled(&self) -> bool {
        self.config.get_bool(config::RELOAD_ON_EDIT, false)
    }

    /// Evaluates a node with the keyword arguments the host supplied.
    pub fn invoke(&mut self, workflow_name: &str, kwargs: Map<String, Value>) -> NodeResult<NodeOutput> {
        self.close();
        let descriptor = self.descriptor(workflow_name)?.clone();
        let schema = &descriptor.schema;

        if descriptor.debug {
            info!(node = %workflow_name, kwargs = kwargs.len(), "Calling {}", descriptor.qualname);
        }

        if let Some(uid) = kwargs.get(UNIQUE_ID) {
            self.current_unique_id = Some(unique_id_of(uid));
        }

        let mut args = Map::new();
        let mut input_desc = Vec::new();
        for (key, value) in kwargs {
            if !descriptor.param_names.contains(&key) {
                continue;
            }
            let value = if self.settings.auto_move_tensors {
                self.device.to_device(value)
            } else {
                value
            };
            let value = match schema.input_types().visible(&key) {
                Some(port) => self.types.autoconvert(&port.port_type, value).map_err(|e| {
                    InvocationError::new(
                        &descriptor.qualname,
                        &descriptor.source_location,
                        anyhow!("Cannot convert input {}: {}", key, e),
                        String::new(),
                    )
                })?,
                None => value,
            };
            if descriptor.debug {
                info!(node = %workflow_name, "kwarg {}", describe_input(&key, &value));
            }
            input_desc.push(describe_input(&key, &value));
            args.insert(key, value);
        }

        let level = effective_verify_level(self.config.as_ref(), &self.settings);
        let origin = descriptor.origin();
        {
            let mut names = Vec::new();
            let mut values = Vec::new();
            let mut port_types = Vec::new();
            for (name, value) in &args {
                if let Some(port) = schema.input_types().visible(name) {
                    names.push(name.clone());
                    values.push(value.clone());
                    port_types.push(port.port_type.clone());
                }
            }
            verify_values(&self.types, level, "INPUT", &values, &port_types, Some(&names), &origin)?;
        }

        if schema.input_is_list() {
            for (name, value) in args.iter_mut() {
                if schema.inputs.is_list.get(name).copied().unwrap_or(false) {
                    continue;
                }
                if let Value::Array(items) = value {
                    if items.len() != 1 {
                        return Err(ContractError::ListInput {
                            name: name.clone(),
                            len: items.len(),
                        }
                        .into());
                    }
                    *value = items.remove(0);
                }
            }
        }

        let mode = self.repair_mode();
        let max_tries = if mode == RepairMode::AutoFix {
            self.config.get_u64(config::MAX_TRIES, 1).max(1)
        } else {
            1
        };
        let retain_previews = self.config.get_bool(config::RETAIN_PREVIEWS, false);
        debug!(function = %descriptor.qualname, max_tries, mode = %mode, "Running node");

        let reload = self.reload_enabled();
        let args = Args::new(args);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let implementation = self.tracker.latest(&descriptor.identity, reload)?;

            let (outcome, console) = {
                let ctx = CallContext::new(self.current_unique_id.clone(), retain_previews, self.preview_store.as_deref());
                let outcome = self.call_once(&descriptor, &implementation, &ctx, &args, level);
                (outcome, ctx.console())
            };

            let failure = match outcome {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };
            error!(function = %descriptor.qualname, attempt, "Error while processing: {:#}", failure);

            let retry = match (&self.repair, mode) {
                (Some(hook), RepairMode::On | RepairMode::AutoFix) => {
                    let report = FailureReport {
                        function: &descriptor.qualname,
                        error: &failure,
                        inputs: &input_desc,
                        console: &console,
                        attempt,
                    };
                    hook.on_failure(&report) == RepairOutcome::Retry
                }
                _ => false,
            };
            if !retry || attempt >= max_tries {
                return Err(classify(&descriptor, failure, console));
            }
            info!(function = %descriptor.qualname, attempt, max_tries, "Retrying after repair");
        }
    }

    fn call_once(
        &self,
        descriptor: &NodeDescriptor,
        implementation: &NodeFn,
        ctx: &CallContext<'_>,
        args: &Args,
        level: VerifyLevel,
    ) -> anyhow::Result<NodeOutput> {
        let returned = implementation(ctx, args)?;

        let schema = &descriptor.schema;
        let return_types: &[PortType] = schema.return_types();
        let result = if return_types.is_empty() {
            if returned != Returned::Nothing {
                return Err(ContractError::UnexpectedReturn {
                    function: descriptor.qualname.clone(),
                    origin: descriptor.origin(),
                }
                .into());
            }
            vec![Value::Null]
        } else {
            let values = returned.into_values();
            if values.len() != return_types.len() {
                return Err(ContractError::Arity {
                    function: descriptor.qualname.clone(),
                    returned: values.len(),
                    expected: return_types.len(),
                    origin: descriptor.origin(),
                }
                .into());
            }
            for (i, value) in values.iter().enumerate() {
                if value.is_null() {
                    warn!("Result {} is None", i);
                }
            }

            verify_values(
                &self.types,
                level,
                "OUTPUT",
                &values,
                return_types,
                schema.return_names.as_deref(),
                &descriptor.origin(),
            )?;

            values
                .into_iter()
                .zip(return_types)
                .map(|(value, port_type)| {
                    let value = if self.settings.auto_move_tensors {
                        self.device.to_host(value)
                    } else {
                        value
                    };
                    self.types
                        .autoconvert(port_type, value)
                        .map_err(|e| anyhow!("Cannot convert output: {}", e))
                })
                .collect::<anyhow::Result<Vec<_>>>()?
        };

        if ctx.has_preview() {
            return Ok(NodeOutput::WithPreview {
                ui: ctx.take_preview(),
                result,
            });
        }
        Ok(NodeOutput::Plain(result))
    }

    /// The host's "should this node re-run" query.
    pub fn is_changed(&mut self, workflow_name: &str, kwargs: Map<String, Value>) -> NodeResult<ChangeSignal> {
        self.close();
        let descriptor: Arc<NodeDescriptor> = self.descriptor(workflow_name)?.clone();

        if descriptor.always_run {
            info!("Always running {}", descriptor.qualname);
            return Ok(ChangeSignal::Always);
        }

        let reload = self.reload_enabled();
        self.tracker.latest(&descriptor.identity, reload)?;

        let token = match &descriptor.is_changed {
            Some(predicate) => predicate(&Args::new(kwargs)).map_err(|cause| {
                error!(function = %descriptor.qualname, "Error in is_changed function: {:#}", cause);
                NodeError::IsChanged {
                    function: descriptor.qualname.clone(),
                    cause,
                }
            })?,
            None => ChangeToken::Neutral,
        };

        let signal = self.tracker.change_signal(&descriptor.identity, token)?;
        if descriptor.debug {
            info!(node = %workflow_name, "is_changed={:?}", signal);
        }
        Ok(signal)
    }
}
