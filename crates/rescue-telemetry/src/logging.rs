//! Structured logging setup.
//!
//! Wraps `tracing-subscriber` with the two output shapes services need:
//! JSON lines for production and a pretty, multi-line format for local work.
//! Recovery log entries carry multi-line request dumps and stack traces, so
//! the pretty format is the one to read by eye.
//!
//! # Example
//!
//! ```rust,ignore
//! use rescue_telemetry::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::development();
//! init_logging(&config)?;
//!
//! tracing::info!(http.method = "GET", http.path = "/users", "Request started");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable, multi-line output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive (e.g., "info", "rescue_middleware=debug,warn").
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            file_line_info: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            file_line_info: true,
            include_target: true,
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

/// Initializes the global log subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` for a bad `level` directive and
/// `TelemetryError::LoggingInit` if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(config.include_target)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(config.include_target)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
    }

    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns error if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
}

/// Standard log field names.
///
/// These are the field names of the recovery middleware's `tracing` sink,
/// for filtering and querying its events. `tracing` macros take field names
/// as literals, so the sink spells them out rather than using these.
pub mod fields {
    /// Request ID field name.
    pub const REQUEST_ID: &str = "request_id";

    /// HTTP method field name.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP path field name.
    pub const HTTP_PATH: &str = "http.path";

    /// Marker tag of a recovery entry.
    pub const MARKER: &str = "marker";

    /// Request dump (method, path, headers; never the body).
    pub const REQUEST_DUMP: &str = "request_dump";

    /// Raw failure description.
    pub const FAILURE: &str = "failure";

    /// Captured stack trace.
    pub const STACK: &str = "stack";

    /// Whether the stack trace hit the capture cap.
    pub const STACK_TRUNCATED: &str = "stack_truncated";

    /// Whether the failure was a panic rather than a returned error.
    pub const PANICKED: &str = "panicked";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file_line_info);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_production_config() {
        let config = LogConfig::production();
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.file_line_info);
    }

    #[test]
    fn test_field_names() {
        assert_eq!(fields::REQUEST_ID, "request_id");
        assert_eq!(fields::HTTP_METHOD, "http.method");
        assert_eq!(fields::STACK, "stack");
        assert_eq!(fields::PANICKED, "panicked");
    }

    #[test]
    fn test_create_env_filter_valid() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("rescue_middleware=debug,warn").is_ok());
    }

    #[test]
    fn test_create_env_filter_invalid() {
        let result = create_env_filter("rescue_middleware=notalevel");
        assert!(matches!(result, Err(TelemetryError::InvalidFilter(_))));
    }

    #[test]
    fn test_log_format_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }

        let parsed: Wrapper = serde_json::from_str(r#"{"format":"pretty"}"#).unwrap();
        assert_eq!(parsed.format, LogFormat::Pretty);
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
