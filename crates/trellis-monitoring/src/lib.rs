//! Monitoring for the Trellis platform.
//!
//! Installs the process-wide `tracing` subscriber and records chain metrics
//! through the `metrics` facade. Without an installed recorder the metric
//! calls are no-ops.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use serde::Deserialize;

/// Structured logging setup
pub mod logging;

/// Chain execution metrics
pub mod metrics;

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,trellis_core=debug")
    pub log_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub enable_json_logging: bool,
    /// Record chain metrics
    pub enable_metrics: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "trellis".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
            enable_metrics: true,
        }
    }
}

pub use crate::logging::{init_logging, LogExt};
pub use crate::metrics::{ChainTimer, GraphMetrics};
