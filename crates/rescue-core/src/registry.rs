//! Code-to-message registry.
//!
//! The registry has two phases. During startup a [`MessageRegistryBuilder`]
//! is seeded with the reserved codes and extended by the application. Calling
//! [`MessageRegistryBuilder::build`] consumes the builder and yields a frozen
//! [`MessageRegistry`] that can be shared freely across request handlers.
//!
//! # Example
//!
//! ```
//! use rescue_core::{codes, MessageRegistry};
//!
//! let registry = MessageRegistry::builder()
//!     .register([(10001, "user not found"), (10002, "user disabled")])
//!     .build();
//!
//! assert_eq!(registry.resolve(10001), "user not found");
//! assert_eq!(registry.resolve(99999), registry.resolve(codes::ERROR));
//! ```

use crate::codes;
use crate::error::ErrorValue;
use http::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

static GLOBAL: OnceLock<MessageRegistry> = OnceLock::new();

/// Errors raised while installing the process-wide registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A registry was already installed, or the default was already handed out.
    #[error("a process-wide message registry is already installed")]
    AlreadyInstalled,
}

/// Frozen mapping from application error code to message.
///
/// Cloning is cheap; all clones share the same table.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    messages: Arc<HashMap<i32, String>>,
}

impl MessageRegistry {
    /// Creates a builder seeded with the reserved codes.
    #[must_use]
    pub fn builder() -> MessageRegistryBuilder {
        MessageRegistryBuilder::new()
    }

    /// Returns the message for `code`, or the generic-failure message when the
    /// code is unknown.
    #[must_use]
    pub fn resolve(&self, code: i32) -> &str {
        self.messages
            .get(&code)
            .or_else(|| self.messages.get(&codes::ERROR))
            .map_or(codes::GENERIC_FAILURE_MESSAGE, String::as_str)
    }

    /// Returns `true` if `code` has its own entry.
    #[must_use]
    pub fn contains(&self, code: i32) -> bool {
        self.messages.contains_key(&code)
    }

    /// Returns the number of registered codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always `false`: the reserved codes are never removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Builds an [`ErrorValue`].
    ///
    /// A non-empty `message` is used verbatim. Otherwise the message is
    /// resolved from this registry.
    #[must_use]
    pub fn gen_error(&self, status: StatusCode, code: i32, message: Option<&str>) -> ErrorValue {
        let message = match message {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => self.resolve(code).to_string(),
        };
        ErrorValue::from_parts(status, code, message)
    }

    /// Installs this registry as the process-wide registry used by
    /// [`gen_error`](crate::gen_error).
    ///
    /// Must run during startup, before the first call to
    /// [`MessageRegistry::global`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyInstalled`] if a registry was installed
    /// earlier or the default registry was already handed out.
    pub fn install(self) -> Result<(), RegistryError> {
        let count = self.len();
        GLOBAL
            .set(self)
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        tracing::debug!(codes = count, "Installed process-wide message registry");
        Ok(())
    }

    /// Returns the process-wide registry.
    ///
    /// Falls back to the default seed when nothing was installed; from then
    /// on the slot is frozen.
    pub fn global() -> &'static MessageRegistry {
        GLOBAL.get_or_init(MessageRegistry::default)
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        MessageRegistryBuilder::new().build()
    }
}

/// Mutable startup phase of a [`MessageRegistry`].
#[derive(Debug, Clone)]
pub struct MessageRegistryBuilder {
    messages: HashMap<i32, String>,
}

impl MessageRegistryBuilder {
    /// Creates a builder seeded with [`codes::SUCCESS`], [`codes::ERROR`] and
    /// [`codes::INVALID_PARAMS`].
    #[must_use]
    pub fn new() -> Self {
        let messages = codes::DEFAULTS
            .iter()
            .map(|(code, message)| (*code, (*message).to_string()))
            .collect();
        Self { messages }
    }

    /// Merges `entries`, overwriting the message of any colliding code.
    ///
    /// Entries with an empty message are skipped.
    #[must_use]
    pub fn register<I, M>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, M)>,
        M: Into<String>,
    {
        for (code, message) in entries {
            let message = message.into();
            if message.is_empty() {
                tracing::warn!(code, "Ignoring empty message for error code");
                continue;
            }
            self.messages.insert(code, message);
        }
        self
    }

    /// Registers a single code.
    #[must_use]
    pub fn insert(self, code: i32, message: impl Into<String>) -> Self {
        self.register([(code, message)])
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> MessageRegistry {
        tracing::debug!(codes = self.messages.len(), "Froze message registry");
        MessageRegistry {
            messages: Arc::new(self.messages),
        }
    }
}

impl Default for MessageRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
