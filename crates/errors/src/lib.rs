//! oidstore-errors - unified error handling

use thiserror::Error;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required parameter was empty or malformed. Raised before any I/O,
    /// carrying the name of the offending parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    /// One or more batch deletions failed during a prune sweep. Raised only
    /// after the sweep finishes; never per batch.
    #[error("Cleanup failed: {} batch deletion(s) failed", .0.len())]
    Cleanup(Vec<StoreError>),

    /// Cooperative cancellation observed at a checkpoint. Uncommitted
    /// transactional work is discarded.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn invalid_argument(param: &'static str) -> Self {
        Self::InvalidArgument(param)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn cleanup(failures: Vec<StoreError>) -> Self {
        Self::Cleanup(failures)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias
pub type StoreResult<T> = Result<T, StoreError>;
