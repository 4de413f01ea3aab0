//! Telemetry configuration
//!
//! Structured logging for the broker binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log level, used when `RUST_LOG` is not set
    pub log_level: String,

    /// Whether to use JSON formatting
    pub json_format: bool,

    /// Whether to include thread IDs
    pub include_thread_ids: bool,

    /// Whether to include target module
    pub include_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from(&LoggingConfig::default())
    }
}

impl From<&LoggingConfig> for TelemetryConfig {
    fn from(logging: &LoggingConfig) -> Self {
        Self {
            log_level: logging.level.clone(),
            json_format: logging.json_format,
            include_thread_ids: logging.include_thread_ids,
            include_target: logging.include_target,
        }
    }
}

impl TelemetryConfig {
    /// Directive used when `RUST_LOG` is not set
    ///
    /// A bare level applies to the broker crates; other crates stay at `warn`.
    pub fn filter_directive(&self) -> String {
        let level = self.log_level.trim();
        if level.contains('=') || level.contains(',') {
            return level.to_string();
        }
        format!(
            "warn,helm_broker={lvl},helm_broker_api={lvl},helm_broker_service={lvl},\
             helm_broker_storage={lvl},tower_http={lvl}",
            lvl = level
        )
    }
}

/// Initialize telemetry with custom configuration
pub fn init_with_config(config: TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    if config.json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(config.include_target)
                    .with_thread_ids(config.include_thread_ids),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(config.include_target)
                    .with_thread_ids(config.include_thread_ids),
            )
            .init();
    }
}
