//! Error types for graph assembly and the operation service

use thiserror::Error;
use trellis_core::CoreError;

/// Graph service error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Error raised by a store or the chain engine
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid or conflicting configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No graph registered under the name
    #[error("Graph '{0}' not found")]
    NotFound(String),

    /// A graph with the name is already registered
    #[error("Graph '{0}' already exists")]
    AlreadyExists(String),

    /// No store factory for the configured store type
    #[error("No store factory registered for store type '{0}'")]
    UnknownStoreType(String),

    /// A graph ended up without a required part
    #[error("Graph '{graph}' has no {part}")]
    MissingPart {
        /// Graph name
        graph: String,
        /// Missing part
        part: &'static str,
    },

    /// The background worker of a chunked execution failed
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;
