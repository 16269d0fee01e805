//!
//! Trellis Core - schema-driven element model and operation engine
//!
//! This crate defines the graph element model, the schema that governs it,
//! the serialiser, comparison and aggregation machinery, and the engine that
//! executes typed operation chains against pluggable stores. Every storage
//! backend of the Trellis platform builds on it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Error types
pub mod error;

/// Domain layer - values, elements, views, functions and schemas
pub mod domain;

/// Value codecs with round-trip and ordering contracts
pub mod serialisation;

/// Element comparators, sorting and min/max
pub mod comparison;

/// Group-aware property aggregation
pub mod aggregation;

/// Operations, handlers and the data flowing between them
pub mod operation;

/// Application services - chain execution
pub mod application;

/// Per-execution context
pub mod context;

/// Cross-execution cache service interface
pub mod cache;

/// Store interface and store properties
pub mod store;

// Re-export key types
pub use application::chain_executor::{ChainExecution, ChainExecutor, ChainStatus};
pub use cache::CacheService;
pub use context::{Context, User};
pub use domain::element::{Edge, Element, ElementId, Entity, Properties};
pub use domain::schema::Schema;
pub use domain::value::{Identifier, Value, ValueType};
pub use domain::view::View;
pub use error::{CoreError, ValidationFailure};
pub use operation::handler::HandlerRegistry;
pub use operation::{Data, DataType, ElementStream, Operation, OperationChain, ReleaseHandle};
pub use store::{Store, StoreProperties};
