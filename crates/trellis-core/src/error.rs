use std::fmt;
use thiserror::Error;

/// Reasons an element was rejected by its group's validators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Group of the rejected element
    pub group: String,

    /// Names of every check that failed, in evaluation order
    pub failures: Vec<String>,
}

impl ValidationFailure {
    /// Create a failure for a group with the given failing checks
    pub fn new(group: impl Into<String>, failures: Vec<String>) -> Self {
        Self {
            group: group.into(),
            failures,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element in group '{}' failed {} check(s): {}",
            self.group,
            self.failures.len(),
            self.failures.join(", ")
        )
    }
}

/// Core error type for the Trellis runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value could not be encoded or decoded
    #[error("Serialisation error: {0}")]
    Serialisation(String),

    /// Two schemas define the same group differently
    #[error("Schema merge error for group '{group}': {reason}")]
    SchemaMerge {
        /// Conflicting group
        group: String,
        /// What differed
        reason: String,
    },

    /// A schema definition is malformed
    #[error("Schema error: {0}")]
    Schema(String),

    /// One or more validators rejected an element
    #[error("Validation failure: {0}")]
    Validation(ValidationFailure),

    /// Adjacent operations in a chain have incompatible types
    #[error("Chain type error at operation {index}: {producer} produces {output} but {consumer} expects {input}")]
    ChainType {
        /// Index of the consuming operation
        index: usize,
        /// Kind of the producing operation
        producer: String,
        /// Declared output type of the producer
        output: String,
        /// Kind of the consuming operation
        consumer: String,
        /// Declared input type of the consumer
        input: String,
    },

    /// The chain is not executable against the store's schema
    #[error("Invalid operation chain: {}", .0.join("; "))]
    InvalidChain(Vec<String>),

    /// No handler is registered for an operation on this store
    #[error("Operation {operation} is not supported by store {store}")]
    UnsupportedOperation {
        /// Operation kind
        operation: String,
        /// Store (graph) identifier
        store: String,
    },

    /// A reducing operation received an empty input
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Handler-level failure
    #[error("Operation error: {message}")]
    Operation {
        /// Description of what failed
        message: String,
        /// Underlying cause, if any
        #[source]
        cause: Option<Box<CoreError>>,
    },

    /// Illegal chain execution state transition
    #[error("Chain execution error: {0}")]
    Execution(String),

    /// Cache service failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    Io(String),
}

impl CoreError {
    /// Handler failure without an underlying cause
    pub fn operation(message: impl Into<String>) -> Self {
        CoreError::Operation {
            message: message.into(),
            cause: None,
        }
    }

    /// Handler failure wrapping an underlying cause
    pub fn operation_caused_by(message: impl Into<String>, cause: CoreError) -> Self {
        CoreError::Operation {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Structural errors are raised before any handler runs
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CoreError::ChainType { .. }
                | CoreError::InvalidChain(_)
                | CoreError::UnsupportedOperation { .. }
        )
    }
}

impl From<ValidationFailure> for CoreError {
    fn from(failure: ValidationFailure) -> Self {
        CoreError::Validation(failure)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialisation(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::Serialisation(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}
