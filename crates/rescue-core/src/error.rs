//! Error values raised by request handlers.
//!
//! Handlers return [`HandlerResult`]. An `Err` is either a deliberate abort
//! carrying an [`ErrorValue`], or an unexpected defect carried as an
//! [`anyhow::Error`]. The recovery middleware formats the first as-is and
//! replaces the second with a generic 500.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use rescue_core::{codes, gen_error, Failure, HandlerResult};
//!
//! fn load_user(id: u64) -> HandlerResult<String> {
//!     if id == 0 {
//!         return Err(gen_error(StatusCode::BAD_REQUEST, codes::INVALID_PARAMS, None).into());
//!     }
//!     Ok(format!("user-{id}"))
//! }
//!
//! assert!(matches!(load_user(0), Err(Failure::Deliberate(_))));
//! ```

use crate::registry::MessageRegistry;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type returned by handlers and middleware.
pub type HandlerResult<T> = Result<T, Failure>;

/// Immutable description of a deliberate failure.
///
/// The message is never empty: when no message is supplied it is resolved
/// from a [`MessageRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status_code:{}, msg:{}", .status.as_u16(), .message)]
pub struct ErrorValue {
    status: StatusCode,
    code: i32,
    message: String,
}

impl ErrorValue {
    /// Creates an error with an explicit message.
    ///
    /// An empty message is resolved from the process-wide registry.
    #[must_use]
    pub fn new(status: StatusCode, code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            return MessageRegistry::global().gen_error(status, code, None);
        }
        Self::from_parts(status, code, message)
    }

    pub(crate) fn from_parts(status: StatusCode, code: i32, message: String) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    /// The HTTP status sent to the client.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The application error code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wire body for this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code,
            message: self.message.clone(),
        }
    }

    /// Wraps this error as a deliberate [`Failure`].
    #[must_use]
    pub fn into_failure(self) -> Failure {
        Failure::Deliberate(self)
    }
}

/// Builds an [`ErrorValue`] against the process-wide registry.
///
/// A non-empty `message` is used verbatim; otherwise the message registered
/// for `code` is used (or the generic-failure message if `code` is unknown).
#[must_use]
pub fn gen_error(status: StatusCode, code: i32, message: Option<&str>) -> ErrorValue {
    MessageRegistry::global().gen_error(status, code, message)
}

/// Why a handler did not produce a response.
#[derive(Debug, Error)]
pub enum Failure {
    /// Business logic aborted the request on purpose.
    #[error(transparent)]
    Deliberate(#[from] ErrorValue),

    /// Anything else: a defect that must be logged and hidden from the client.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Failure {
    /// Wraps any error as an unexpected failure.
    pub fn unexpected<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unexpected(anyhow::Error::new(error))
    }

    /// Creates an unexpected failure from a plain description.
    pub fn msg<M>(description: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Unexpected(anyhow::Error::msg(description))
    }

    /// Returns `true` for [`Failure::Deliberate`].
    #[must_use]
    pub const fn is_deliberate(&self) -> bool {
        matches!(self, Self::Deliberate(_))
    }
}

/// JSON body written for every failed request.
///
/// Serialises to exactly `{"code":<int>,"message":<string>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Application error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// Serialises the body to JSON.
    ///
    /// # Errors
    ///
    /// Propagates the serializer error; for this shape it does not occur in
    /// practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
