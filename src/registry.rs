//! Owned process-wide state: the type registry, the node table and the
//! live-update bookkeeping.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::config::{ConfigSource, DocstringMode, MapConfig, Settings};
use crate::error::{NodeError, NodeResult, RegistrationError};
use crate::node::descriptor::{NodeDescriptor, NodeInfo, NodeSchema};
use crate::node::function::{Args, NodeFn};
use crate::node::inference::{infer_explicit_outputs, infer_inputs, infer_outputs};
use crate::node::signature::{FunctionSpec, NodeOptions};
use crate::runtime::context::PreviewStore;
use crate::runtime::device::{DevicePlacement, HostOnly};
use crate::runtime::live::{Fingerprint, LiveUpdateTracker, NodeModule, impl_cell};
use crate::runtime::repair::RepairHook;
use crate::types::builtin::register_builtin_types;
use crate::types::registry::{TypeRegistration, TypeRegistry};

/// The two maps the host reads to populate its palette, keyed by workflow name.
#[derive(Debug, Default)]
pub struct NodeMappings {
    classes: BTreeMap<String, Arc<NodeDescriptor>>,
    display_names: BTreeMap<String, String>,
}

impl NodeMappings {
    pub fn get(&self, workflow_name: &str) -> Option<&Arc<NodeDescriptor>> {
        self.classes.get(workflow_name)
    }

    pub fn display_name(&self, workflow_name: &str) -> Option<&str> {
        self.display_names.get(workflow_name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &Arc<NodeDescriptor>)> {
        self.classes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn display_names(&self) -> &BTreeMap<String, String> {
        &self.display_names
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn to_host_json(&self) -> Value {
        let classes: Map<String, Value> = self
            .classes
            .iter()
            .map(|(name, descriptor)| (name.clone(), descriptor.to_host_json()))
            .collect();
        json!({
            "NODE_CLASS_MAPPINGS": classes,
            "NODE_DISPLAY_NAME_MAPPINGS": self.display_names,
        })
    }

    fn insert(&mut self, descriptor: Arc<NodeDescriptor>) {
        let workflow_name = descriptor.workflow_name().to_string();
        self.display_names
            .insert(workflow_name.clone(), descriptor.display_name().to_string());
        self.classes.insert(workflow_name, descriptor);
    }
}

/// Title-cases each `_`-separated word of a function name.
fn name_parts(name: &str) -> Vec<String> {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

fn describe(doc: Option<&str>, mode: DocstringMode) -> String {
    let Some(doc) = doc.map(str::trim).filter(|d| !d.is_empty()) else {
        return String::new();
    };
    match mode {
        DocstringMode::None => String::new(),
        DocstringMode::Brief => doc.lines().next().unwrap_or_default().to_string(),
        DocstringMode::Full => doc.to_string(),
    }
}

fn file_time(spec: &FunctionSpec) -> SystemTime {
    spec.file
        .as_ref()
        .and_then(|f| fs::metadata(f).and_then(|m| m.modified()).ok())
        .unwrap_or(UNIX_EPOCH)
}

pub struct Registry {
    pub(crate) settings: Settings,
    pub(crate) config: Box<dyn ConfigSource>,
    pub(crate) types: TypeRegistry,
    pub(crate) mappings: NodeMappings,
    pub(crate) tracker: LiveUpdateTracker,
    pub(crate) device: Box<dyn DevicePlacement>,
    pub(crate) repair: Option<Box<dyn RepairHook>>,
    pub(crate) preview_store: Option<Box<dyn PreviewStore>>,
    pub(crate) current_unique_id: Option<String>,
    functions: HashSet<String>,
    owners: HashSet<String>,
    host_names: HashSet<String>,
    host_display_names: HashSet<String>,
    closed: bool,
    num_registered: usize,
}

impl Registry {
    /// An empty registry with no types registered.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            config: Box::new(MapConfig::new()),
            types: TypeRegistry::new(),
            mappings: NodeMappings::default(),
            tracker: LiveUpdateTracker::new(),
            device: Box::new(HostOnly),
            repair: None,
            preview_store: None,
            current_unique_id: None,
            functions: HashSet::new(),
            owners: HashSet::new(),
            host_names: HashSet::new(),
            host_display_names: HashSet::new(),
            closed: false,
            num_registered: 0,
        }
    }

    /// Registers the standard `INT`, `FLOAT`, `STRING`, `BOOLEAN` and tensor types.
    pub fn with_builtin_types(mut self) -> NodeResult<Self> {
        register_builtin_types(&mut self.types)?;
        Ok(self)
    }

    pub fn with_config(mut self, config: impl ConfigSource + 'static) -> Self {
        self.config = Box::new(config);
        self
    }

    pub fn with_device(mut self, device: impl DevicePlacement + 'static) -> Self {
        self.device = Box::new(device);
        self
    }

    pub fn with_repair_hook(mut self, hook: impl RepairHook + 'static) -> Self {
        self.repair = Some(Box::new(hook));
        self
    }

    pub fn with_preview_store(mut self, store: impl PreviewStore + 'static) -> Self {
        self.preview_store = Some(Box::new(store));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn tracker(&self) -> &LiveUpdateTracker {
        &self.tracker
    }

    pub fn register_type(&mut self, registration: TypeRegistration) -> NodeResult<()> {
        self.types.register(registration)?;
        Ok(())
    }

    /// Marks a node already provided by the host so name checks cover it.
    pub fn reserve_host_node(&mut self, workflow_name: &str, display_name: &str) {
        self.host_names.insert(workflow_name.to_string());
        self.host_display_names.insert(display_name.to_string());
    }

    /// Starts live reload tracking for a module's file.
    pub fn add_module(&mut self, module: Arc<dyn NodeModule>) {
        if let Ok(modified) = fs::metadata(module.path()).and_then(|m| m.modified()) {
            self.tracker.note_module_time(module.name(), modified);
        }
        self.tracker.add_module(module);
    }

    /// Closes registration. Called on the host's first evaluation; later
    /// registrations (e.g. from reloaded modules) become no-ops.
    pub fn close(&mut self) {
        if !self.closed {
            debug!(nodes = self.num_registered, "Closing registration");
        }
        self.closed = true;
        self.types.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn num_registered(&self) -> usize {
        self.num_registered
    }

    pub fn current_unique_id(&self) -> Option<&str> {
        self.current_unique_id.as_deref()
    }

    pub fn node_mappings(&self) -> &NodeMappings {
        &self.mappings
    }

    pub fn descriptor(&self, workflow_name: &str) -> NodeResult<&Arc<NodeDescriptor>> {
        self.mappings
            .get(workflow_name)
            .ok_or_else(|| NodeError::UnknownNode(workflow_name.to_string()))
    }

    /// Host-side input validation hook.
    pub fn validate_inputs(&self, workflow_name: &str, kwargs: Map<String, Value>) -> NodeResult<anyhow::Result<()>> {
        let descriptor = self.descriptor(workflow_name)?;
        Ok(descriptor.validate_inputs(&Args::new(kwargs)))
    }

    /// Turns a function into a node and adds it to the mappings.
    ///
    /// Returns `None` when registration is closed.
    pub fn register_node(
        &mut self,
        spec: FunctionSpec,
        options: NodeOptions,
        implementation: NodeFn,
    ) -> NodeResult<Option<Arc<NodeDescriptor>>> {
        if self.closed {
            debug!(function = %spec.path(), "Registration closed, ignoring node");
            return Ok(None);
        }

        let identity = spec.path();
        if self.functions.contains(&identity) {
            return Err(RegistrationError::DuplicateFunction(identity).into());
        }

        let inputs = infer_inputs(&spec, &self.types)?;
        let outputs = match &options.return_types {
            Some(explicit) => infer_explicit_outputs(explicit, &self.types)?,
            None => infer_outputs(&spec.returns, &self.types)?,
        };
        if let Some(names) = &options.return_names {
            if names.len() != outputs.len() {
                return Err(RegistrationError::ReturnNamesMismatch {
                    names: names.len(),
                    types: outputs.len(),
                }
                .into());
            }
        }

        // Nothing could ever schedule a node with no outputs unless it is an output node.
        let is_output_node = options.is_output_node || outputs.is_empty();

        let parts = name_parts(&spec.name);
        let display_name = options.display_name.clone().unwrap_or_else(|| parts.join(" "));
        let workflow_name = options.workflow_name.clone().unwrap_or_else(|| parts.concat());
        let category = options
            .category
            .clone()
            .unwrap_or_else(|| self.settings.default_category.clone());
        let description = options
            .description
            .clone()
            .unwrap_or_else(|| describe(spec.doc.as_deref(), self.settings.docstring_mode));
        let source_location = spec.source_location();
        let info = NodeInfo::new(
            options.color.as_deref(),
            options.bg_color.as_deref(),
            options.height,
            options.width,
            Some(source_location.clone()),
        )?;

        if self.mappings.get(&workflow_name).is_some() || self.host_names.contains(&workflow_name) {
            return Err(RegistrationError::DuplicateNode {
                workflow_name,
                function: spec.qualname(),
            }
            .into());
        }
        let display_taken = self.host_display_names.contains(&display_name)
            || self.mappings.display_names.values().any(|d| *d == display_name);
        if display_taken {
            return Err(RegistrationError::DuplicateDisplayName(display_name).into());
        }
        if let Some(owner) = &spec.owner {
            if self.owners.contains(owner) {
                return Err(RegistrationError::DuplicateOwner(owner.clone()).into());
            }
        }

        let modified = file_time(&spec);
        let module = (!spec.module.is_empty()).then_some(spec.module.as_str());
        if let Some(module) = module {
            self.tracker.note_module_time(module, modified);
        }
        let cell = impl_cell(implementation.clone());
        self.tracker.register_function(
            &identity,
            &spec.name,
            module,
            &cell,
            implementation,
            Fingerprint::of_source(spec.source.as_deref()),
            modified,
        )?;

        let descriptor = Arc::new(NodeDescriptor {
            schema: NodeSchema {
                workflow_name,
                display_name,
                category,
                function: format!("{}_node_wrapper", spec.qualname()),
                inputs,
                outputs,
                return_names: options.return_names.clone(),
                is_output_node,
                description,
                info,
            },
            identity: identity.clone(),
            qualname: spec.qualname(),
            param_names: spec.param_names(),
            source_location,
            implementation: cell,
            validate_inputs: options.validate_inputs.clone(),
            is_changed: options.is_changed.clone(),
            always_run: options.always_run,
            debug: options.debug,
        });

        if descriptor.debug {
            info!(
                node = %descriptor.workflow_name(),
                schema = %descriptor.to_host_json(),
                "Registered node"
            );
        } else {
            debug!(node = %descriptor.workflow_name(), function = %identity, "Registered node");
        }

        self.functions.insert(identity);
        if let Some(owner) = spec.owner {
            self.owners.insert(owner);
        }
        self.mappings.insert(descriptor.clone());
        self.num_registered += 1;
        Ok(Some(descriptor))
    }
}
