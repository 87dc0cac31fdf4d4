//! Job store error types.

use podcaster_models::{JobId, JobStatus, TransitionError};
use thiserror::Error;

/// Result type for job store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Compare-and-set lost: the persisted status was not the expected one.
    #[error("Job {job_id} is {actual}, expected {expected}")]
    Conflict {
        job_id: JobId,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Job {job_id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id} is still {status}")]
    StillActive { job_id: JobId, status: JobStatus },

    #[error("Job id already exists: {0}")]
    Duplicate(JobId),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt job record: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn from_transition(job_id: &JobId, err: TransitionError) -> Self {
        match err {
            TransitionError::Conflict { expected, actual } => Self::Conflict {
                job_id: job_id.clone(),
                expected,
                actual,
            },
            TransitionError::Invalid { from, to } => Self::InvalidTransition {
                job_id: job_id.clone(),
                from,
                to,
            },
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Redis(e) => {
                e.is_io_error() || e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped()
            }
            _ => false,
        }
    }
}
