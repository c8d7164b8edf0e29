//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] blog_database::DatabaseError),

    /// SQLite error raised directly inside a unit-of-work transaction
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record not found
    #[error("Outbox record not found: {0}")]
    NotFound(i64),

    /// Record was already delivered and cannot be requeued
    #[error("Outbox record {0} was already delivered")]
    AlreadyDelivered(i64),

    /// Background task failed to join
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
