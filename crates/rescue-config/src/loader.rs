//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use rescue_telemetry::LogFormat;

use crate::config::SinkKind;
use crate::{ConfigError, RescueConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use rescue_config::ConfigLoader;
///
/// # fn main() -> Result<(), rescue_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("rescue.toml")?
///     .with_env_prefix("RESCUE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: RescueConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RescueConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use rescue_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = RescueConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = RescueConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format (TOML or JSON) is chosen by the file extension. The file
    /// replaces the current layer; sections it omits take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// contains unknown fields or has an unsupported extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &extension)
            .map_err(|e| match e {
                ConfigError::UnsupportedFormat(_) => {
                    ConfigError::UnsupportedFormat(path.display().to_string())
                }
                other => other,
            })?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use rescue_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [recovery]
    ///     marker = "[api]"
    ///
    ///     [messages]
    ///     "10001" = "user not found"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.recovery.marker, "[api]");
    /// assert_eq!(config.messages["10001"], "user not found");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, for
    /// example with prefix `RESCUE`:
    /// - `RESCUE__RECOVERY__MARKER=[api]`
    /// - `RESCUE__RECOVERY__REDACT_HEADERS=authorization,x-api-key`
    /// - `RESCUE__MESSAGES__10001=user not found`
    /// - `RESCUE__LOGGING__FORMAT=pretty`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the final
    /// configuration is invalid.
    pub fn load(mut self) -> Result<RescueConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(key, _)| key.starts_with(&format!("{prefix}__")))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> RescueConfig {
        self.config
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = path.split("__").collect();
        let recovery = &mut self.config.recovery;

        match parts.as_slice() {
            ["RECOVERY", "MARKER"] => recovery.marker = value.to_string(),
            ["RECOVERY", "INITIAL_STACK_BYTES"] => {
                recovery.initial_stack_bytes = parse_usize(key, value)?;
            }
            ["RECOVERY", "MAX_STACK_BYTES"] => {
                recovery.max_stack_bytes = parse_usize(key, value)?;
            }
            ["RECOVERY", "REDACT_HEADERS"] => {
                recovery.redact_headers = value
                    .split(',')
                    .map(|name| name.trim().to_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect();
            }
            ["RECOVERY", "PANIC_SITE_TRACES"] => {
                recovery.panic_site_traces = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["RECOVERY", "SINK"] => {
                recovery.sink = match value.to_lowercase().as_str() {
                    "tracing" => SinkKind::Tracing,
                    "stderr" => SinkKind::Stderr,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'tracing' or 'stderr'",
                        ))
                    }
                };
            }
            ["RECOVERY", "COLOR"] => {
                recovery.color = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            ["MESSAGES", code] => {
                self.config
                    .messages
                    .insert((*code).to_string(), value.to_string());
            }

            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => self.config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            _ => tracing::warn!(var = key, "Ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<RescueConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
