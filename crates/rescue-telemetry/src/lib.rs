//! Structured logging for services protected by the Rescue recovery boundary.
//!
//! The recovery middleware's default sink emits `tracing` events; this crate
//! installs the subscriber that turns them into JSON or human-readable lines.
//!
//! # Example
//!
//! ```rust,ignore
//! use rescue_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!("service started");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
