//! Reserved application error codes.
//!
//! These codes are always present in a [`MessageRegistry`](crate::MessageRegistry).
//! Applications register their own codes alongside them; collisions overwrite
//! the default message but never remove the entry.

/// The request succeeded.
pub const SUCCESS: i32 = 200;

/// Generic, unclassified failure.
///
/// Unknown codes resolve to the message registered here, and the recovery
/// middleware answers every unexpected defect with this code.
pub const ERROR: i32 = 500;

/// The request carried invalid parameters.
pub const INVALID_PARAMS: i32 = 400;

/// Message used for [`ERROR`] when nothing else was registered.
pub const GENERIC_FAILURE_MESSAGE: &str = "fail";

/// The seed every registry starts from.
pub(crate) const DEFAULTS: [(i32, &str); 3] = [
    (SUCCESS, "ok"),
    (ERROR, GENERIC_FAILURE_MESSAGE),
    (INVALID_PARAMS, "Bad request params"),
];
