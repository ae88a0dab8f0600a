use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RegistrationError;
use crate::types::verifier::{SubclassVerifier, Verifier};
use crate::types::{Annotation, NativeType, PortType, TypeKey};

/// One native type as registered.
#[derive(Debug, Clone)]
pub struct PortTypeEntry {
    pub key: TypeKey,
    pub port_name: String,
    pub auto_convert: bool,
    pub force_input: bool,
}

/// Arguments to [`TypeRegistry::register`].
#[derive(Debug, Clone)]
pub struct TypeRegistration {
    key: TypeKey,
    name: Option<String>,
    auto_convert: bool,
    force_input: bool,
    auto_register: bool,
    verifier: Option<Arc<dyn Verifier>>,
}

impl TypeRegistration {
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            name: None,
            auto_convert: false,
            force_input: false,
            auto_register: false,
            verifier: None,
        }
    }

    pub fn of<T: NativeType>() -> Self {
        Self::new(TypeKey::of::<T>())
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn auto_convert(mut self) -> Self {
        self.auto_convert = true;
        self
    }

    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }

    /// Tolerate the type already being registered.
    pub fn auto_register(mut self) -> Self {
        self.auto_register = true;
        self
    }

    pub fn verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }
}

/// Maps native type identities to port-type names and carries the validator
/// for each port-type name.
///
/// The first type registered under a port name is canonical: its validator
/// (or the default kind check) is the one used for verification and its kind
/// drives auto-conversion. Later types under the same name only add their own
/// conversion and force-input flags.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: HashMap<String, PortTypeEntry>,
    canonical: HashMap<String, TypeKey>,
    verifiers: HashMap<String, Arc<dyn Verifier>>,
    closed: bool,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn register(&mut self, registration: TypeRegistration) -> Result<(), RegistrationError> {
        if self.closed {
            debug!(ty = %registration.key, "Type registry closed, ignoring registration");
            return Ok(());
        }

        let TypeRegistration {
            key,
            name,
            auto_convert,
            force_input,
            auto_register,
            verifier,
        } = registration;
        let port_name = name.unwrap_or_else(|| key.short_name().to_string());

        if self.entries.contains_key(key.path()) {
            if auto_register {
                return Ok(());
            }
            return Err(RegistrationError::DuplicateType(key.path().to_string()));
        }

        if !self.canonical.contains_key(&port_name) {
            let verifier: Arc<dyn Verifier> = match verifier {
                Some(v) => v,
                None => Arc::new(SubclassVerifier::new(key.clone())),
            };
            self.canonical.insert(port_name.clone(), key.clone());
            self.verifiers.insert(port_name.clone(), verifier);
        } else if verifier.is_some() {
            warn!("Custom verifier for {} already registered. Ignoring new one.", port_name);
        }

        debug!(ty = %key, port = %port_name, "Registered type");
        self.entries.insert(
            key.path().to_string(),
            PortTypeEntry {
                key,
                port_name,
                auto_convert,
                force_input,
            },
        );
        Ok(())
    }

    pub fn entry(&self, key: &TypeKey) -> Option<&PortTypeEntry> {
        self.entries.get(key.path())
    }

    pub fn is_registered(&self, key: &TypeKey) -> bool {
        self.entries.contains_key(key.path())
    }

    /// The canonical native type registered under a port name.
    pub fn canonical_key(&self, port_name: &str) -> Option<&TypeKey> {
        self.canonical.get(port_name)
    }

    pub fn verifier(&self, port_name: &str) -> Option<&Arc<dyn Verifier>> {
        self.verifiers.get(port_name)
    }

    pub fn force_input(&self, annotation: &Annotation) -> bool {
        annotation
            .type_key()
            .and_then(|key| self.entry(key))
            .is_some_and(|entry| entry.force_input)
    }

    /// Resolves a declared annotation to its port type.
    ///
    /// An empty annotation is the wildcard. A list resolves through its
    /// element type. An unregistered type is an error, never a wildcard.
    pub fn resolve(&self, annotation: &Annotation) -> Result<PortType, RegistrationError> {
        match annotation {
            Annotation::Empty => Ok(PortType::Any),
            Annotation::Type(key) => match self.entries.get(key.path()) {
                Some(entry) => Ok(PortType::Named(entry.port_name.clone())),
                None => {
                    warn!("Type '{}' not registered", key);
                    Err(RegistrationError::UnregisteredType(key.path().to_string()))
                }
            },
            Annotation::List(inner) => self.resolve(inner),
            Annotation::Tuple(_) => Err(RegistrationError::TupleParameter(annotation.to_string())),
        }
    }

    pub fn should_autoconvert(&self, port_type: &PortType) -> bool {
        let PortType::Named(name) = port_type else {
            return false;
        };
        self.canonical
            .get(name)
            .and_then(|key| self.entries.get(key.path()))
            .is_some_and(|entry| entry.auto_convert)
    }

    /// Converts a value (or each element of a list value) into the canonical
    /// kind of the port, when the port asks for it.
    pub fn autoconvert(&self, port_type: &PortType, value: Value) -> Result<Value, String> {
        if !self.should_autoconvert(port_type) {
            return Ok(value);
        }
        let Some(key) = port_type.name().and_then(|name| self.canonical.get(name)) else {
            return Ok(value);
        };
        let kind = key.kind();
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| kind.convert(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => kind.convert(other),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
