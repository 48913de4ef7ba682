//! Coordinate error types.

use thiserror::Error;

/// Errors raised while parsing or resolving a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// The coordinate is structurally invalid.
    #[error("malformed coordinate '{input}': {reason}")]
    Malformed {
        /// The offending input, rendered as text.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl CoordinateError {
    pub(crate) fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for coordinate operations.
pub type CoordinateResult<T> = Result<T, CoordinateError>;
