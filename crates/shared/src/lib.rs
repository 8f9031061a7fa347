//! # codesync-shared
//!
//! Shared error handling, result type, and request-scoped context for the
//! codesync workspace.
//!
//! This crate provides foundational types used across all other crates:
//!
//! - Structured error envelope with stable codes and retry classification
//! - The workspace-wide `Result` alias
//! - Correlation ids and cooperative cancellation (`RequestContext`)
//! - Secret redaction helpers for logs and error metadata
//!
//! ## Design Principles
//!
//! 1. **No workspace dependencies** - only external crates
//! 2. **Serde-compatible** - persisted/public types serialize cleanly

pub mod context;
pub mod errors;
pub mod redaction;
pub mod result;

pub use context::{CancellationToken, CorrelationId, RequestContext};
pub use errors::{
    ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, normalize_unexpected_error,
};
pub use redaction::{REDACTED, SecretString, is_secret_key, redact_if_secret};
pub use result::Result;

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_error_types_are_available() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(error.kind, ErrorKind::Expected);
        assert_eq!(error.class, ErrorClass::NonRetriable);
    }

    #[test]
    fn shared_result_type_is_available() {
        let value: Result<u32> = Ok(5);
        assert!(matches!(value.map(|value| value + 1), Ok(6)));
    }
}
