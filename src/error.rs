//! Error types for the similarity indexes

use thiserror::Error;

use crate::record::RecordId;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Error types that can occur in index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Record not found: {id}")]
    RecordNotFound { id: RecordId },

    #[error("Duplicate record id: {id}")]
    DuplicateId { id: RecordId },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },

    #[error("Index invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
