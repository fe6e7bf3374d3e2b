//! Domain errors.

use thiserror::Error;

/// Value object construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    /// The value was empty (or whitespace only)
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// The value exceeded the maximum length
    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// Persistence collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No record exists for the given connection
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    /// The underlying store failed
    #[error("storage error: {0}")]
    Storage(String),
}
