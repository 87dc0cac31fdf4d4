//! Worker error types.

use podcaster_media::MediaError;
use podcaster_queue::{DispatchError, QueueError};
use podcaster_storage::StorageError;
use podcaster_store::StoreError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A job input is missing or not usable. Terminal for the job.
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),

    #[error("Processing failed: {0}")]
    Media(#[from] MediaError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn input_unavailable(msg: impl Into<String>) -> Self {
        Self::InputUnavailable(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether retrying the same step may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::Storage(e) => e.is_transient(),
            WorkerError::Store(e) => e.is_transient(),
            WorkerError::Queue(e) => e.is_transient(),
            WorkerError::Dispatch(DispatchError::Store(e)) => e.is_transient(),
            WorkerError::Dispatch(DispatchError::Publish { source, .. }) => source.is_transient(),
            WorkerError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
            ),
            _ => false,
        }
    }

    /// Message recorded on a `FAILED` job.
    pub fn diagnostic(&self) -> String {
        match self {
            WorkerError::Media(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let io = WorkerError::Io(std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr"));
        assert!(io.is_transient());
        let missing = WorkerError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!missing.is_transient());
        assert!(!WorkerError::input_unavailable("no main track").is_transient());
        assert!(!WorkerError::Media(MediaError::ToolNotFound("ffmpeg".into())).is_transient());
        assert!(WorkerError::Queue(QueueError::connection_failed("down")).is_transient());
    }

    #[test]
    fn test_media_diagnostic_includes_stderr() {
        let err = WorkerError::Media(MediaError::tool_failed(
            "ffmpeg",
            "ffmpeg exited with exit status: 1",
            Some("Invalid data found when processing input".into()),
            Some(1),
        ));
        assert!(err.diagnostic().ends_with("Invalid data found when processing input"));
    }
}
