//! Index error types
//!
//! Defines all errors the index façade can return. Every failure is
//! deterministic: a failed call leaves the index untouched.

use crate::metric::ValidationError;
use thiserror::Error;

/// Errors that can occur in index operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Definition refused on add
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Malformed glob pattern
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// Empty expression list or bad tag expression
    #[error("Expression error: {0}")]
    Expression(String),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::Expression("no tags specified".to_string());
        assert_eq!(err.to_string(), "Expression error: no tags specified");

        let err: IndexError = ValidationError::EmptyName.into();
        assert_eq!(err.to_string(), "Validation error: name cannot be empty");
    }
}
