//! Storage error types.

use podcaster_models::IdentifierError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage roots are missing, not directories, or not writable.
    #[error("Storage misconfigured: {0}")]
    Config(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Payload exceeds the upload limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The artifact is still referenced by an active job.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upload stream failed: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Map a `NotFound` I/O error onto [`StorageError::NotFound`].
    pub fn from_io(err: std::io::Error, what: impl Into<String>) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(what.into())
        } else {
            Self::Io(err)
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
            ),
            _ => false,
        }
    }
}
