//! Source fingerprints, hot-swapping of node implementations and the change
//! signal the host uses to decide whether a node must re-run.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{ConsistencyError, NodeError, NodeResult};
use crate::node::function::NodeFn;
use crate::runtime::context::hex;

/// SHA-256 of a function's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// All zeroes when the source is unavailable.
    pub fn of_source(source: Option<&str>) -> Self {
        match source {
            Some(text) => Fingerprint(Sha256::digest(text.as_bytes()).into()),
            None => Fingerprint::default(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// XORs `token` into the low eight bytes.
    pub fn mix(self, token: u64) -> Self {
        let mut bytes = self.0;
        for (b, t) in bytes[24..].iter_mut().zip(token.to_be_bytes()) {
            *b ^= t;
        }
        Fingerprint(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

/// What a node's `is_changed` predicate reports about its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeToken {
    #[default]
    Neutral,
    Hash(u64),
    /// Re-run on every evaluation.
    Always,
}

impl ChangeToken {
    pub fn of<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        ChangeToken::Hash(hasher.finish())
    }
}

/// Value the host compares between evaluations; a differing value marks the
/// node dirty. `Always` never equals anything, itself included.
#[derive(Debug, Clone, Copy)]
pub enum ChangeSignal {
    Always,
    Value(Fingerprint),
}

impl ChangeSignal {
    pub fn is_always(&self) -> bool {
        matches!(self, ChangeSignal::Always)
    }
}

impl PartialEq for ChangeSignal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ChangeSignal::Value(a), ChangeSignal::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for ChangeSignal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // JSON has no NaN literal.
            ChangeSignal::Always => serializer.serialize_str("NaN"),
            ChangeSignal::Value(fp) => serializer.collect_str(fp),
        }
    }
}

/// Swappable reference to the current implementation of a node.
pub type ImplCell = Arc<RwLock<NodeFn>>;

pub fn impl_cell(implementation: NodeFn) -> ImplCell {
    Arc::new(RwLock::new(implementation))
}

pub fn load_impl(cell: &ImplCell) -> NodeFn {
    cell.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn store_impl(cell: &ImplCell, implementation: NodeFn) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = implementation;
}

/// Bookkeeping for one function identity.
pub struct RegistrationRecord {
    pub implementation: ImplCell,
    pub fingerprint: Fingerprint,
    pub updated_at: SystemTime,
    pub module: Option<String>,
    pub name: String,
}

impl fmt::Debug for RegistrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRecord")
            .field("fingerprint", &self.fingerprint.to_string())
            .field("updated_at", &self.updated_at)
            .field("module", &self.module)
            .field("name", &self.name)
            .finish()
    }
}

/// One freshly loaded function from a [`NodeModule`].
#[derive(Clone)]
pub struct FunctionSource {
    pub implementation: NodeFn,
    pub source: String,
}

pub type ModuleContents = HashMap<String, FunctionSource>;

/// A reloadable unit of node code backed by a file on disk.
pub trait NodeModule: Send + Sync {
    fn name(&self) -> &str;

    fn path(&self) -> &Path;

    /// Re-reads the module and returns every function it defines, by name.
    fn load(&self) -> anyhow::Result<ModuleContents>;
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Tracks registered implementations and swaps them when their module changes
/// on disk.
#[derive(Default)]
pub struct LiveUpdateTracker {
    records: HashMap<String, RegistrationRecord>,
    modules: HashMap<String, Arc<dyn NodeModule>>,
    module_reload_times: HashMap<String, SystemTime>,
}

impl LiveUpdateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `implementation` for `identity`, writing it into `cell`.
    ///
    /// A repeat registration is an update: it must carry a strictly newer
    /// timestamp and a different fingerprint.
    pub fn register_function(
        &mut self,
        identity: &str,
        name: &str,
        module: Option<&str>,
        cell: &ImplCell,
        implementation: NodeFn,
        fingerprint: Fingerprint,
        updated_at: SystemTime,
    ) -> Result<(), ConsistencyError> {
        if let Some(existing) = self.records.get_mut(identity) {
            if existing.updated_at >= updated_at {
                return Err(ConsistencyError::StaleTimestamp {
                    function: identity.to_string(),
                    stored: existing.updated_at,
                    offered: updated_at,
                });
            }
            if existing.fingerprint == fingerprint {
                return Err(ConsistencyError::SameFingerprint {
                    function: identity.to_string(),
                    fingerprint: fingerprint.to_string(),
                });
            }
            store_impl(&existing.implementation, implementation);
            existing.fingerprint = fingerprint;
            existing.updated_at = updated_at;
            return Ok(());
        }

        store_impl(cell, implementation);
        self.records.insert(
            identity.to_string(),
            RegistrationRecord {
                implementation: cell.clone(),
                fingerprint,
                updated_at,
                module: module.map(str::to_string),
                name: name.to_string(),
            },
        );
        Ok(())
    }

    pub fn record(&self, identity: &str) -> Option<&RegistrationRecord> {
        self.records.get(identity)
    }

    pub fn fingerprint(&self, identity: &str) -> Option<Fingerprint> {
        self.records.get(identity).map(|r| r.fingerprint)
    }

    pub fn add_module(&mut self, module: Arc<dyn NodeModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn module(&self, name: &str) -> Option<&Arc<dyn NodeModule>> {
        self.modules.get(name)
    }

    /// Marks `module` as loaded at `time`, so only later edits trigger a reload.
    pub fn note_module_time(&mut self, module: &str, time: SystemTime) {
        self.module_reload_times.insert(module.to_string(), time);
    }

    /// Returns the freshest implementation of `identity`, reloading its module
    /// first when reload is enabled and the file changed since the last load.
    pub fn latest(&mut self, identity: &str, reload_enabled: bool) -> NodeResult<NodeFn> {
        let record = self
            .records
            .get(identity)
            .ok_or_else(|| ConsistencyError::MissingRecord(identity.to_string()))?;

        let module_name = match (&record.module, reload_enabled) {
            (Some(m), true) => m.clone(),
            _ => return Ok(load_impl(&record.implementation)),
        };
        let Some(module) = self.modules.get(&module_name).cloned() else {
            return Ok(load_impl(&record.implementation));
        };
        let Some(modified) = modified_time(module.path()) else {
            warn!(module = %module_name, path = %module.path().display(), "Module file not readable");
            return Ok(load_impl(&record.implementation));
        };

        let last_reload = self.module_reload_times.get(&module_name).copied();
        if last_reload.is_none_or(|t| modified > t) {
            info!(module = %module_name, "Reloading module because file was edited");
            let contents = module.load().map_err(|cause| NodeError::Reload {
                module: module_name.clone(),
                cause,
            })?;
            self.module_reload_times.insert(module_name.clone(), modified);
            self.apply_reload(&module_name, &contents, modified)?;
        } else {
            debug!(module = %module_name, "Module up to date");
        }

        let record = self
            .records
            .get(identity)
            .ok_or_else(|| ConsistencyError::MissingRecord(identity.to_string()))?;
        Ok(load_impl(&record.implementation))
    }

    fn apply_reload(&mut self, module_name: &str, contents: &ModuleContents, modified: SystemTime) -> NodeResult<()> {
        let stale: Vec<(String, String)> = self
            .records
            .iter()
            .filter(|(_, r)| r.module.as_deref() == Some(module_name) && modified > r.updated_at)
            .map(|(id, r)| (id.clone(), r.name.clone()))
            .collect();

        for (identity, name) in stale {
            let Some(fresh) = contents.get(&name) else {
                warn!(function = %identity, "Function no longer present after reload");
                continue;
            };
            let fingerprint = Fingerprint::of_source(Some(&fresh.source));
            if self.fingerprint(&identity) == Some(fingerprint) {
                continue;
            }
            info!(function = %identity, fingerprint = %fingerprint, "Updating function because it was modified");
            let cell = match self.records.get(&identity) {
                Some(r) => r.implementation.clone(),
                None => continue,
            };
            self.register_function(
                &identity,
                &name,
                Some(module_name),
                &cell,
                fresh.implementation.clone(),
                fingerprint,
                modified,
            )?;
        }
        Ok(())
    }

    /// Combines the code fingerprint with the node's custom change token.
    pub fn change_signal(&self, identity: &str, token: ChangeToken) -> NodeResult<ChangeSignal> {
        let fingerprint = self
            .fingerprint(identity)
            .ok_or_else(|| ConsistencyError::MissingRecord(identity.to_string()))?;
        Ok(match token {
            ChangeToken::Always => ChangeSignal::Always,
            ChangeToken::Neutral => ChangeSignal::Value(fingerprint),
            ChangeToken::Hash(h) => ChangeSignal::Value(fingerprint.mix(h)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_is_reversible() {
        let fp = Fingerprint::of_source(Some("fn body"));
        assert_eq!(fp.mix(42).mix(42), fp);
        assert_ne!(fp.mix(42), fp);
    }

    #[test]
    fn test_always_signal_never_equal() {
        assert_ne!(ChangeSignal::Always, ChangeSignal::Always);
        let fp = Fingerprint::of_source(None);
        assert_eq!(ChangeSignal::Value(fp), ChangeSignal::Value(fp));
    }

    #[test]
    fn test_always_signal_serializes_as_nan() {
        let json = serde_json::to_value(ChangeSignal::Always).expect("serialize");
        assert_eq!(json, serde_json::json!("NaN"));
        let fp = Fingerprint::of_source(Some("x"));
        let json = serde_json::to_value(ChangeSignal::Value(fp)).expect("serialize");
        assert_eq!(json, serde_json::json!(fp.to_string()));
    }
}
