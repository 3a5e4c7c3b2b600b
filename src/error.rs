//! Internal assertion failures (spec §7.4).
//!
//! Distinct from [`crate::cancellation::Cancelled`]: cancellation is an expected, cooperative
//! exit that leaves the evaluator reusable, while an [`InternalError`] marks a broken invariant
//! the evaluator itself cannot recover from. It is still returned through the nearest
//! `Result`-returning caller rather than panicking, so one malformed input can't take down a
//! long-lived embedding process — genuinely-unreachable `match` arms are the one place this crate
//! still uses `unreachable!()`, same as the teacher.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct InternalError {
    pub message: String,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal error: {}", self.message)
    }
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Builds an [`InternalError`] from a format string and logs it via `tracing::error!` before
/// returning it, so a driver that only looks at its own error type still gets a trace of where
/// and why the invariant broke.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::error!(message = %message, "internal error");
        $crate::error::InternalError::new(message)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_formats_message() {
        let err = InternalError::new("MRO slot out of range");
        assert_eq!(err.to_string(), "internal error: MRO slot out of range");
    }

    #[test]
    fn internal_error_macro_builds_error_with_formatted_message() {
        let err: InternalError = internal_error!("bad index {}", 3);
        assert_eq!(err.message, "bad index 3");
    }
}
