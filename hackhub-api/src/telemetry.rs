//! Logging initialization
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! JSON or a human-readable fmt layer.

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{ApiError, ApiResult, ErrorCode};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "hackhub-api".to_string(),
            format: LogFormat::Json,
            default_filter: "hackhub_api=info,hackhub_storage=info,warn".to_string(),
        }
    }
}

impl LogConfig {
    /// Environment variables:
    /// - `HACKHUB_LOG_FORMAT`: `json` or `pretty` (default: json)
    /// - `HACKHUB_SERVICE_NAME`: service name (default: hackhub-api)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("HACKHUB_SERVICE_NAME").unwrap_or(defaults.service_name),
            format: std::env::var("HACKHUB_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.format),
            default_filter: defaults.default_filter,
        }
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| {
            ApiError::new(
                ErrorCode::InternalError,
                format!("Failed to init subscriber: {}", e),
            )
        })?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}
