//! # Rescue
//!
//! Recovery middleware for HTTP handlers. Deliberate aborts become JSON
//! error responses; unexpected failures and panics become a generic 500 plus
//! one diagnostic log entry.
//!
//! ## Quick start
//!
//! ```
//! use rescue::prelude::*;
//!
//! # fn main() -> Result<(), rescue::RescueError> {
//! let config = ConfigLoader::new()
//!     .with_string("[messages]\n\"10001\" = \"user not found\"\n", "toml")?
//!     .load()?;
//!
//! let rescue = Rescue::from_config(&config)?;
//! let pipeline = rescue.pipeline().build();
//!
//! assert_eq!(rescue.registry().resolve(10001), "user not found");
//! assert_eq!(pipeline.stage_names(), vec!["recovery"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate               | Contents                                         |
//! |---------------------|--------------------------------------------------|
//! | [`core`]            | `ErrorValue`, `Failure`, the message registry    |
//! | [`middleware`]      | `RecoveryMiddleware`, sinks, the pipeline        |
//! | [`config`]          | `RescueConfig` and the layered `ConfigLoader`    |
//! | [`telemetry`]       | `tracing-subscriber` setup                       |

#![doc(html_root_url = "https://docs.rs/rescue/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod setup;

pub use setup::{Rescue, RescueError};

// Re-export core types
pub use rescue_core as core;

// Re-export middleware types
pub use rescue_middleware as middleware;

// Re-export configuration types
pub use rescue_config as config;

// Re-export telemetry types
pub use rescue_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```
/// use rescue::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Rescue, RescueError};

    pub use rescue_core::{codes, gen_error, ErrorValue, Failure, HandlerResult, MessageRegistry};

    pub use rescue_middleware::{
        BoxFuture, LogSink, MemorySink, Middleware, MiddlewareContext, Next, Outcome, Pipeline,
        RecoveryMiddleware, Request, Response, ResponseExt, TracingSink, WriterSink,
    };

    pub use rescue_config::{ConfigLoader, RescueConfig};
}
