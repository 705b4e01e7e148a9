//! Configuration types.
//!
//! [`RescueConfig`] is the root. Every section has defaults, so an empty file
//! is a valid configuration.

use std::collections::BTreeMap;

use http::header::HeaderName;
use rescue_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Complete recovery configuration.
///
/// # Example
///
/// ```
/// use rescue_config::RescueConfig;
///
/// let config = RescueConfig::default();
/// assert_eq!(config.recovery.marker, "[Recovery]");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct RescueConfig {
    /// Recovery middleware settings.
    #[serde(default)]
    pub recovery: RecoverySection,

    /// Extra code-to-message entries, keyed by the decimal code.
    ///
    /// Keys are strings because TOML table keys are.
    #[serde(default)]
    pub messages: BTreeMap<String, String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RescueConfig {
    /// Development preset: pretty logs at `debug`, colored stderr entries.
    #[must_use]
    pub fn development() -> Self {
        Self {
            recovery: RecoverySection {
                sink: SinkKind::Stderr,
                color: true,
                ..RecoverySection::default()
            },
            messages: BTreeMap::new(),
            logging: LoggingSection {
                enabled: true,
                level: "debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }

    /// Production preset: JSON logs at `info`, entries through `tracing`.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The marker is empty
    /// - Stack bounds are zero or the initial size exceeds the cap
    /// - A redacted header is not a valid header name
    /// - A message key is not an `i32` or a message is empty
    /// - The log level is not a valid filter directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recovery.validate()?;

        for (key, message) in &self.messages {
            if key.trim().parse::<i32>().is_err() {
                return Err(ConfigError::invalid_value(
                    format!("messages.{key}"),
                    "key must be an integer error code",
                ));
            }
            if message.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("messages.{key}"),
                    "message must not be empty",
                ));
            }
        }

        if self.logging.enabled {
            rescue_telemetry::create_env_filter(&self.logging.level).map_err(|e| {
                ConfigError::invalid_value("logging.level", e.to_string())
            })?;
        }

        Ok(())
    }

    /// Message entries with parsed codes.
    ///
    /// Entries whose key is not an integer are skipped; [`Self::validate`]
    /// rejects them.
    pub fn message_entries(&self) -> impl Iterator<Item = (i32, &str)> + '_ {
        self.messages
            .iter()
            .filter_map(|(key, message)| Some((key.trim().parse().ok()?, message.as_str())))
    }
}

/// Where recovery entries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One `tracing` error event per entry.
    #[default]
    Tracing,
    /// A timestamped block on standard error.
    Stderr,
}

/// `[recovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct RecoverySection {
    /// Tag written at the start of every entry.
    pub marker: String,

    /// First stack buffer size in bytes.
    pub initial_stack_bytes: usize,

    /// Stack buffer cap in bytes.
    pub max_stack_bytes: usize,

    /// Headers whose values are redacted in request dumps.
    pub redact_headers: Vec<String>,

    /// Trace panics from the panic site rather than the recovery boundary.
    pub panic_site_traces: bool,

    /// Entry destination.
    pub sink: SinkKind,

    /// Red ANSI output for the stderr sink.
    pub color: bool,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            marker: "[Recovery]".to_string(),
            initial_stack_bytes: 8 * 1024,
            max_stack_bytes: 1024 * 1024,
            redact_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "proxy-authorization".to_string(),
            ],
            panic_site_traces: true,
            sink: SinkKind::Tracing,
            color: false,
        }
    }
}

impl RecoverySection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.marker.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "recovery.marker",
                "must not be empty",
            ));
        }

        if self.initial_stack_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "recovery.initial_stack_bytes",
                "must be greater than zero",
            ));
        }

        if self.initial_stack_bytes > self.max_stack_bytes {
            return Err(ConfigError::invalid_value(
                "recovery.max_stack_bytes",
                format!(
                    "must be at least initial_stack_bytes ({})",
                    self.initial_stack_bytes
                ),
            ));
        }

        if let Some(name) = self
            .redact_headers
            .iter()
            .find(|name| HeaderName::from_bytes(name.as_bytes()).is_err())
        {
            return Err(ConfigError::invalid_value(
                "recovery.redact_headers",
                format!("invalid header name: {name:?}"),
            ));
        }

        Ok(())
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSection {
    /// Whether to install a log subscriber.
    pub enabled: bool,

    /// Filter directive.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl From<&LoggingSection> for LogConfig {
    fn from(section: &LoggingSection) -> Self {
        Self {
            enabled: section.enabled,
            level: section.level.clone(),
            format: section.format,
            ..LogConfig::default()
        }
    }
}
