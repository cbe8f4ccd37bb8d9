// packages/engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! The library only emits `tracing` events and `metrics` counters. Installing a
//! subscriber and a recorder is left to the host process (the binary calls
//! both functions here at startup).

use crate::utils::config::{LogFormat, LoggingConfig};
use crate::utils::errors::{EngineError, Result};
use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const EVENTS_TOTAL: &str = "probelog_events_total";
pub const SERIALIZED_TOTAL: &str = "probelog_serialized_total";
pub const SERIALIZATION_FAILURES_TOTAL: &str = "probelog_serialization_failures_total";
pub const PROBES_EXCLUDED_TOTAL: &str = "probelog_probes_excluded_total";
pub const SINK_FAILURES_TOTAL: &str = "probelog_sink_failures_total";
pub const ASYNC_COMPLETIONS_TOTAL: &str = "probelog_async_completions_total";

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides `config.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            EngineError::ConfigError(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    installed.map_err(|e| EngineError::ConfigError(format!("Tracing init failed: {}", e)))
}

/// Install the Prometheus recorder and describe the engine's counters
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EngineError::ConfigError(format!("Metrics init failed: {}", e)))?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(EVENTS_TOTAL, Unit::Count, "Events written to the sink");
    describe_counter!(
        SERIALIZED_TOTAL,
        Unit::Count,
        "Events carrying a serialized payload"
    );
    describe_counter!(
        SERIALIZATION_FAILURES_TOTAL,
        Unit::Count,
        "Values whose serialization failed"
    );
    describe_counter!(
        PROBES_EXCLUDED_TOTAL,
        Unit::Count,
        "Probes removed from deep serialization by the exclusion index"
    );
    describe_counter!(
        SINK_FAILURES_TOTAL,
        Unit::Count,
        "Sink appends that failed and were dropped"
    );
    describe_counter!(
        ASYNC_COMPLETIONS_TOTAL,
        Unit::Count,
        "Completion events written for asynchronous producers"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "probelog=verbose".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(matches!(
            init_tracing(&config),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            EVENTS_TOTAL,
            SERIALIZED_TOTAL,
            SERIALIZATION_FAILURES_TOTAL,
            PROBES_EXCLUDED_TOTAL,
            SINK_FAILURES_TOTAL,
            ASYNC_COMPLETIONS_TOTAL,
        ] {
            assert!(name.starts_with("probelog_"));
            assert!(name.ends_with("_total"));
        }
    }
}
