//! Shared data models for the Podcaster media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Validated identifiers (sessions, jobs, file names)
//! - Upload sessions and their role-keyed files
//! - Processing jobs and their status state machine
//! - Job requests for each supported job kind
//! - Artifact categories and keys

pub mod artifact;
pub mod ids;
pub mod job;
pub mod request;
pub mod session;
pub mod utils;

// Re-export common types
pub use artifact::{ArtifactKey, Category};
pub use ids::{validate_component, FileName, IdentifierError, JobId, SessionId};
pub use job::{
    JobFilter, JobStatus, JobStatusSnapshot, OutputRef, ProcessingJob, StatusUpdate,
    TransitionError,
};
pub use request::{
    InputRef, JobKind, JobRequest, RequestError, TranscriptionOptions, WaveformOptions,
};
pub use session::{Role, StoredFile, UploadSession};
pub use utils::{bounded_message, MAX_ERROR_MESSAGE_LEN};
