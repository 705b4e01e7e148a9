//! # Rescue Core
//!
//! Error values and the code-to-message registry used by the Rescue recovery
//! middleware.
//!
//! - [`ErrorValue`] - Immutable status/code/message triple raised by business logic
//! - [`Failure`] - Deliberate abort or unexpected defect, returned by handlers
//! - [`MessageRegistry`] - Frozen code-to-message table with a generic fallback
//! - [`gen_error`] - Builds an [`ErrorValue`], resolving the message when absent

#![doc(html_root_url = "https://docs.rs/rescue-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod codes;
mod error;
mod registry;

pub use error::{gen_error, ErrorBody, ErrorValue, Failure, HandlerResult};
pub use registry::{MessageRegistry, MessageRegistryBuilder, RegistryError};
