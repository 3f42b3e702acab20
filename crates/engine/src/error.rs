//! Engine error types.

use std::time::Duration;

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors surfaced by the calculation, queue and audit services.
#[derive(Debug, Error)]
pub enum HppError {
    /// Recipe or ingredient missing in the account.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed recipe graph.
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity in a state the operation cannot handle (e.g. zero servings).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Arithmetic produced a value that cannot be represented.
    #[error("calculation error: {0}")]
    Calculation(String),

    /// Calculation exceeded its time budget.
    #[error("calculation timed out after {0:?}")]
    Timeout(Duration),

    /// Store failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl HppError {
    /// Whether running the same operation again could succeed without any
    /// change to the data.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(_) | Self::Timeout(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, HppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(HppError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(HppError::Repository(RepositoryError::NotFound).is_retryable());
        assert!(!HppError::NotFound("recipe".into()).is_retryable());
        assert!(!HppError::InvalidState("servings".into()).is_retryable());
        assert!(!HppError::Calculation("overflow".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = HppError::Validation("line quantity must be positive".into());
        assert_eq!(err.to_string(), "validation error: line quantity must be positive");

        let err = HppError::from(RepositoryError::Conflict("duplicate".into()));
        assert_eq!(err.to_string(), "repository error: constraint violation: duplicate");
    }
}
