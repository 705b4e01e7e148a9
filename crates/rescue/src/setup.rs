//! Wiring from configuration to a running recovery boundary.

use std::path::Path;
use std::sync::Arc;

use rescue_config::{ConfigError, ConfigLoader, RescueConfig, SinkKind};
use rescue_core::{MessageRegistry, RegistryError};
use rescue_middleware::{
    LogSink, Pipeline, PipelineBuilder, RecoveryMiddleware, RecoveryMiddlewareBuilder,
    TracingSink, WriterSink,
};
use rescue_telemetry::{LogConfig, TelemetryError};
use thiserror::Error;

/// Environment prefix read by [`Rescue::from_file`].
pub const ENV_PREFIX: &str = "RESCUE";

/// Errors raised while setting up recovery.
#[derive(Debug, Error)]
pub enum RescueError {
    /// The configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The log subscriber could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The process-wide registry was already installed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A validated configuration together with the registry built from it.
#[derive(Debug, Clone)]
pub struct Rescue {
    config: RescueConfig,
    registry: MessageRegistry,
}

impl Rescue {
    /// Validates `config` and builds its message registry.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::Config` if the configuration is invalid.
    pub fn from_config(config: &RescueConfig) -> Result<Self, RescueError> {
        config.validate()?;

        let registry = MessageRegistry::builder()
            .register(config.message_entries())
            .build();
        tracing::debug!(messages = registry.len(), "Built message registry from configuration");

        Ok(Self {
            config: config.clone(),
            registry,
        })
    }

    /// Loads `path` (if it exists) with `RESCUE__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::Config` if loading or validation fails.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RescueError> {
        let config = ConfigLoader::new()
            .with_optional_file(path)?
            .with_env_prefix(ENV_PREFIX)
            .load()?;
        Self::from_config(&config)
    }

    /// The configuration this was built from.
    #[must_use]
    pub fn config(&self) -> &RescueConfig {
        &self.config
    }

    /// The registry built from the configured messages.
    #[must_use]
    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Installs the registry as the process-wide one, so
    /// [`rescue_core::gen_error`] and [`rescue_core::ErrorValue::new`]
    /// resolve configured messages.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::Registry` if a registry was already installed.
    pub fn install_registry(&self) -> Result<(), RescueError> {
        self.registry.clone().install()?;
        Ok(())
    }

    /// Installs the global log subscriber from the `[logging]` section.
    ///
    /// # Errors
    ///
    /// Returns `RescueError::Telemetry` if a subscriber is already set.
    pub fn init_logging(&self) -> Result<(), RescueError> {
        rescue_telemetry::init_logging(&LogConfig::from(&self.config.logging))?;
        Ok(())
    }

    /// A recovery builder preloaded with the configuration, without a sink.
    fn recovery_builder(&self) -> RecoveryMiddlewareBuilder {
        let recovery = &self.config.recovery;
        RecoveryMiddleware::builder()
            .registry(self.registry.clone())
            .marker(recovery.marker.clone())
            .stack_limits(recovery.initial_stack_bytes, recovery.max_stack_bytes)
            .redact_headers(&recovery.redact_headers)
            .panic_site_traces(recovery.panic_site_traces)
    }

    /// Builds the recovery middleware with the configured sink.
    #[must_use]
    pub fn recovery(&self) -> RecoveryMiddleware {
        let sink: Arc<dyn LogSink> = match self.config.recovery.sink {
            SinkKind::Tracing => Arc::new(TracingSink),
            SinkKind::Stderr => {
                Arc::new(WriterSink::new(std::io::stderr()).with_color(self.config.recovery.color))
            }
        };
        self.recovery_builder().shared_sink(sink).build()
    }

    /// Builds the recovery middleware writing to `sink` instead of the
    /// configured one.
    #[must_use]
    pub fn recovery_with_sink(&self, sink: impl LogSink) -> RecoveryMiddleware {
        self.recovery_builder().sink(sink).build()
    }

    /// A pipeline builder guarded by [`Self::recovery`].
    #[must_use]
    pub fn pipeline(&self) -> PipelineBuilder {
        Pipeline::builder(self.recovery())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_core::codes;

    fn config(toml: &str) -> RescueConfig {
        ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load_unvalidated()
    }

    #[test]
    fn test_from_config_builds_registry() {
        let rescue = Rescue::from_config(&config(
            "[messages]\n\"10001\" = \"user not found\"\n\"500\" = \"try again later\"\n",
        ))
        .unwrap();

        assert_eq!(rescue.registry().resolve(10001), "user not found");
        assert_eq!(rescue.registry().resolve(codes::ERROR), "try again later");
        assert_eq!(rescue.registry().resolve(codes::INVALID_PARAMS), "Bad request params");
        assert_eq!(rescue.registry().resolve(777), "try again later");
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let result = Rescue::from_config(&config("[recovery]\nmarker = \"\"\n"));
        assert!(matches!(result, Err(RescueError::Config(_))));
    }

    #[test]
    fn test_recovery_uses_configured_settings() {
        let rescue = Rescue::from_config(&config(
            "[recovery]\nmarker = \"[api]\"\ninitial_stack_bytes = 2048\nmax_stack_bytes = 4096\nsink = \"stderr\"\n",
        ))
        .unwrap();

        let recovery = rescue.recovery();
        assert_eq!(recovery.marker(), "[api]");
        assert_eq!(recovery.stack_capture().initial_bytes(), 2048);
        assert_eq!(recovery.stack_capture().max_bytes(), 4096);
        assert_eq!(recovery.registry().resolve(codes::ERROR), "fail");
    }

    #[test]
    fn test_from_file_missing_uses_defaults() {
        let rescue = Rescue::from_file("/nonexistent/rescue.toml").unwrap();
        assert_eq!(rescue.config().recovery.marker, "[Recovery]");
    }
}
