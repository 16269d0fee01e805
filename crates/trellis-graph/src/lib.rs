//! Trellis Graph - graph assembly and the operation service
//!
//! Reads graph configurations, builds stores through registered factories,
//! and executes operation chains against graphs by name.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use trellis_monitoring::{init_logging, LogExt};
use trellis_store_inmemory::InMemoryCacheService;

/// Graph and service configuration
pub mod config;

/// Error types
pub mod error;

/// Graphs
pub mod graph;

/// Graph registry and store factories
pub mod registry;

/// Operation service
pub mod service;

pub use config::{GraphConfig, GraphConfigs, ServiceConfig};
pub use error::{GraphError, GraphResult};
pub use graph::Graph;
pub use registry::{GraphParts, GraphRegistry, StoreFactory};
pub use service::OperationService;

/// Build a service from the process environment
///
/// Installs logging when no subscriber is set yet, registers every graph
/// declared through `TRELLIS_GRAPH_` variables, and shares one in-memory
/// cache service across executions.
pub fn bootstrap() -> GraphResult<OperationService> {
    let config = ServiceConfig::load();
    init_logging(&config.monitoring())
        .log_err("Logging was not initialised")
        .ok();

    let registry = GraphRegistry::with_default_factories();
    registry.add_all(&GraphConfigs::from_env()?)?;
    Ok(OperationService::new(Arc::new(registry), &config)
        .with_cache_service(Arc::new(InMemoryCacheService::new())))
}
