//! Domain error types.

use thiserror::Error;

/// Errors raised when an aggregate rejects a state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field was empty or malformed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The aggregate was already deleted in this unit of work
    #[error("{entity} {id} has been deleted")]
    Deleted { entity: &'static str, id: String },

    /// The post is already published
    #[error("Post {0} is already published")]
    AlreadyPublished(String),

    /// A role string did not match any known role
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// Result type alias using DomainError.
pub type DomainResult<T> = Result<T, DomainError>;
