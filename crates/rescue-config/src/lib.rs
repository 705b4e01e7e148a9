//! Typed configuration for the Rescue recovery middleware.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides (`PREFIX__SECTION__KEY`)
//! - Strict parsing (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use rescue_config::ConfigLoader;
//!
//! # fn main() -> Result<(), rescue_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("rescue.toml")?
//!     .with_env_prefix("RESCUE")
//!     .load()?;
//!
//! println!("recovery marker: {}", config.recovery.marker);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [recovery]
//! marker = "[Recovery]"
//! initial_stack_bytes = 8192
//! max_stack_bytes = 1048576
//! redact_headers = ["authorization", "cookie", "proxy-authorization"]
//! panic_site_traces = true
//! sink = "tracing"   # or "stderr"
//! color = false
//!
//! [messages]
//! "10001" = "user not found"
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"    # or "pretty"
//! ```

#![doc(html_root_url = "https://docs.rs/rescue-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{LoggingSection, RecoverySection, RescueConfig, SinkKind};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use rescue_telemetry::LogFormat;
