//! Exit-code mapping.

use codesync_shared::{ErrorEnvelope, ErrorKind};

/// Everything completed cleanly.
pub const SUCCESS: i32 = 0;
/// A pre-flight check rejected the operation.
pub const PRE_FLIGHT: i32 = 1;
/// The operation completed with per-file errors.
pub const PARTIAL: i32 = 2;
/// A fatal runtime failure.
pub const FATAL: i32 = 3;

/// Map a thrown error to an exit code: expected (pre-flight and
/// operational) rejections are 1, everything else is fatal.
#[must_use]
pub fn code_for_error(error: &ErrorEnvelope) -> i32 {
    match error.kind {
        ErrorKind::Expected => PRE_FLIGHT,
        ErrorKind::Invariant | ErrorKind::Unexpected => FATAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_shared::{ErrorClass, ErrorCode};

    #[test]
    fn expected_errors_are_preflight() {
        let error = ErrorEnvelope::expected(ErrorCode::new("repo", "already_exists"), "exists");
        assert_eq!(code_for_error(&error), PRE_FLIGHT);
    }

    #[test]
    fn unexpected_errors_are_fatal() {
        let error = ErrorEnvelope::unexpected(
            ErrorCode::io(),
            "disk on fire",
            ErrorClass::NonRetriable,
        );
        assert_eq!(code_for_error(&error), FATAL);
    }
}
