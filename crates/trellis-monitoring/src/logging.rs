//! Structured logging using tracing.
//!
//! Output is either pretty, for development, or JSON lines for log
//! aggregation. `RUST_LOG` takes precedence over the configured filter.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::MonitoringConfig;

/// Build the filter, preferring `RUST_LOG` when it is set and valid
pub fn env_filter(config: &MonitoringConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
}

/// Initialize structured logging
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.enable_json_logging {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    };

    let subscriber = tracing_subscriber::registry()
        .with(output)
        .with(env_filter(config));
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    info!(
        service_name = %config.service_name,
        log_format = if config.enable_json_logging { "json" } else { "pretty" },
        "Logging initialized"
    );
    Ok(())
}

/// Trait to add log context to results
pub trait LogExt<T, E> {
    /// Log the error with a message before returning
    fn log_err(self, message: &str) -> Result<T, E>;

    /// Log the message on success before returning
    fn log_ok(self, message: &str) -> Result<T, E>;
}

impl<T, E: std::fmt::Display> LogExt<T, E> for Result<T, E> {
    fn log_err(self, message: &str) -> Result<T, E> {
        if let Err(ref e) = self {
            tracing::error!(error = %e, "{}", message);
        }
        self
    }

    fn log_ok(self, message: &str) -> Result<T, E> {
        if self.is_ok() {
            tracing::info!("{}", message);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ext_passes_results_through() {
        let ok: Result<u8, String> = Ok(3);
        assert_eq!(ok.log_ok("done").log_err("failed"), Ok(3));

        let err: Result<u8, String> = Err("boom".to_string());
        assert_eq!(err.log_err("failed").log_ok("done"), Err("boom".to_string()));
    }

    #[test]
    fn test_configured_filter_is_used_without_env() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = MonitoringConfig {
            log_filter: "warn".to_string(),
            ..MonitoringConfig::default()
        };
        assert_eq!(env_filter(&config).to_string(), "warn");
    }
}
