//! Error types for the audit pipeline.

use thiserror::Error;

/// Main error type for the audit pipeline.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Sink-level errors that are not plain I/O or database failures.
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database errors.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type alias for audit pipeline operations.
pub type AuditResult<T> = Result<T, AuditError>;
