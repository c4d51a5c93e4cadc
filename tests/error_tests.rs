//! Tests for the error system.

use device_auth::auth::AuthError;
use device_auth::error::{Error, ErrorCategory};

#[test]
fn transport_failures_map_to_network_errors() {
    let network_error = reqwest::Client::new()
        .get("http://[::1")
        .build()
        .unwrap_err();

    let err = Error::from(AuthError::from(network_error));

    assert_eq!(err.category(), ErrorCategory::Network);
    assert!(err.is_retryable());
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        (Error::from(AuthError::Timeout(10_000)), ErrorCategory::Timeout, true),
        (Error::from(AuthError::ExpiredGrant), ErrorCategory::Authentication, false),
        (Error::from(AuthError::NoSubscription), ErrorCategory::Authentication, false),
        (Error::from(AuthError::from(serde_error)), ErrorCategory::Serialization, false),
        (Error::from(io_error), ErrorCategory::Io, false),
        (Error::Configuration("bad".into()), ErrorCategory::Configuration, false),
    ];

    for (error, category, retryable) in cases {
        assert_eq!(error.category(), category, "{error}");
        assert_eq!(error.is_retryable(), retryable, "{error}");
    }
}

#[test]
fn auth_errors_display_with_context() {
    let err = Error::from(AuthError::AccessDenied("user declined".into()));
    assert_eq!(
        err.to_string(),
        "Authentication error: Access denied: user declined"
    );
}
