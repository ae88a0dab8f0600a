use thiserror::Error;

/// Author mistakes caught while a function is being turned into a node.
/// These abort registration; nothing is partially registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Type {0} already registered.")]
    DuplicateType(String),

    #[error("Type '{0}' not registered")]
    UnregisteredType(String),

    #[error("Tuple annotation '{0}' is only valid as a return type")]
    TupleParameter(String),

    #[error("Value {value} is less than the minimum allowed {min}.")]
    BelowMinimum { value: f64, min: f64 },

    #[error("Value {value} is greater than the maximum allowed {max}.")]
    AboveMaximum { value: f64, max: f64 },

    #[error("Default value {0} is not a finite number")]
    NonFiniteDefault(f64),

    #[error("Choice widget needs at least one option")]
    EmptyChoice,

    #[error("Function {0} already registered")]
    DuplicateFunction(String),

    #[error("Node class '{workflow_name} ({function})' already exists!")]
    DuplicateNode {
        workflow_name: String,
        function: String,
    },

    #[error("Display name '{0}' already exists!")]
    DuplicateDisplayName(String),

    #[error("Only one method from '{0}' can be used as a node.")]
    DuplicateOwner(String),

    #[error(
        "Number of output names must match number of return types. Got {names} names and {types} return types."
    )]
    ReturnNamesMismatch { names: usize, types: usize },

    #[error("Color must be a hex color code, got {0}")]
    InvalidColor(String),
}

/// A value failed the validator registered for its port type under the
/// `fatal` severity policy.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct VerificationError {
    pub message: String,
}

/// Shape violations between what the host or the wrapped function supplied
/// and what the node schema declares.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error(
        "{function}: Number of return values {returned} does not match number of return types {expected}\n{origin}"
    )]
    Arity {
        function: String,
        returned: usize,
        expected: usize,
        origin: String,
    },

    #[error("{function}: Return value is not None, but no return type specified.\n{origin}")]
    UnexpectedReturn { function: String, origin: String },

    #[error("Expected a single value for {name}, but got {len}")]
    ListInput { name: String, len: usize },
}

/// Internal accounting bugs in the live-update bookkeeping.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("Function {function} already registered with later timestamp! {stored:?} >= {offered:?}")]
    StaleTimestamp {
        function: String,
        stored: std::time::SystemTime,
        offered: std::time::SystemTime,
    },

    #[error("Function {function} already registered with same checksum! {fingerprint}")]
    SameFingerprint { function: String, fingerprint: String },

    #[error("No registration record for {0}")]
    MissingRecord(String),
}

/// The wrapped function failed and no retry was left.
///
/// `frames` is the cause chain, outermost first; `interesting_levels` tells
/// the host how many of them are worth showing before truncating.
#[derive(Debug, Error)]
#[error("{function}: {cause:#}\n Source: {location}")]
pub struct InvocationError {
    pub function: String,
    pub location: String,
    pub frames: Vec<String>,
    pub interesting_levels: usize,
    pub console: String,
    pub cause: anyhow::Error,
}

impl InvocationError {
    pub fn new(function: &str, location: &str, cause: anyhow::Error, console: String) -> Self {
        let frames: Vec<String> = cause.chain().map(|c| c.to_string()).collect();
        let interesting_levels = frames.len().saturating_sub(1);
        Self {
            function: function.to_string(),
            location: location.to_string(),
            frames,
            interesting_levels,
            console,
            cause,
        }
    }

    /// Downcasts the underlying cause, e.g. to [`ContractError`].
    pub fn cause_as<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.cause.downcast_ref::<E>()
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Failed to reload module '{module}': {cause:#}")]
    Reload { module: String, cause: anyhow::Error },

    #[error("Error in is_changed function for {function}: {cause:#}")]
    IsChanged { function: String, cause: anyhow::Error },
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
