//! Process-wide registry installation.
//!
//! Kept in its own test binary: the global slot can be written only once per
//! process.

use http::StatusCode;
use rescue_core::{codes, gen_error, ErrorValue, MessageRegistry, RegistryError};

#[test]
fn test_install_then_resolve_through_gen_error() {
    MessageRegistry::builder()
        .register([(10001, "user not found"), (codes::ERROR, "internal failure")])
        .build()
        .install()
        .expect("first install succeeds");

    let err = gen_error(StatusCode::NOT_FOUND, 10001, None);
    assert_eq!(err.message(), "user not found");

    let unknown = gen_error(StatusCode::INTERNAL_SERVER_ERROR, 77, None);
    assert_eq!(unknown.message(), "internal failure");

    let explicit = ErrorValue::new(StatusCode::FORBIDDEN, 10001, "");
    assert_eq!(explicit.message(), "user not found");

    let second = MessageRegistry::default().install();
    assert!(matches!(second, Err(RegistryError::AlreadyInstalled)));
    assert_eq!(MessageRegistry::global().resolve(10001), "user not found");
}
