//! Turns plain functions into nodes for a visual dataflow editor: port schema
//! inference, runtime verification around every call, and live reload of
//! edited node code.

pub mod config;
pub mod error;
pub mod module;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod types;

pub use error::{NodeError, NodeResult};
pub use registry::{NodeMappings, Registry};
pub use runtime::wrapper::NodeOutput;

pub mod prelude {
    pub use crate::config::{ConfigSource, MapConfig, Settings, VerifyLevel};
    pub use crate::error::{NodeError, NodeResult};
    pub use crate::node::function::{Args, NodeFn, Returned, node_fn};
    pub use crate::node::signature::{FunctionSpec, NodeOptions, Receiver};
    pub use crate::node::widgets::{Choice, NumberInput, ParamDefault, StringInput};
    pub use crate::registry::Registry;
    pub use crate::runtime::context::CallContext;
    pub use crate::runtime::live::{ChangeSignal, ChangeToken};
    pub use crate::runtime::wrapper::NodeOutput;
    pub use crate::types::registry::TypeRegistration;
    pub use crate::types::{Annotation, NativeType, ValueKind};
}
