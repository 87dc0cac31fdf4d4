//! Processing jobs and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::{validate_component, FileName, IdentifierError, JobId};
use crate::request::{InputRef, JobKind, JobRequest};
use crate::utils::{bounded_message, MAX_ERROR_MESSAGE_LEN};

/// Job processing status.
///
/// The only legal edges are `PENDING -> PROCESSING`,
/// `PROCESSING -> COMPLETED` and `PROCESSING -> FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, waiting for a worker to claim it
    #[default]
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Output written and recorded
    Completed,
    /// Collaborator or input failure, message recorded
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("unknown job status: {s}")),
        }
    }
}

/// Location of a job's primary artifact, relative to the processed root.
///
/// Always `<job_id>/<file name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputRef {
    job_id: JobId,
    file_name: FileName,
}

impl OutputRef {
    pub fn new(job_id: JobId, file_name: FileName) -> Self {
        Self { job_id, file_name }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn file_name(&self) -> &FileName {
        &self.file_name
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_id, self.file_name)
    }
}

impl TryFrom<String> for OutputRef {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (job, file) = value
            .split_once('/')
            .ok_or_else(|| IdentifierError::InvalidCharacter {
                value: value.clone(),
                ch: '/',
            })?;
        validate_component(job)?;
        validate_component(file)?;
        Ok(Self {
            job_id: JobId::parse(job)?,
            file_name: FileName::parse(file)?,
        })
    }
}

impl From<OutputRef> for String {
    fn from(output: OutputRef) -> Self {
        output.to_string()
    }
}

/// Target status of a transition together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Processing,
    Completed { output_ref: OutputRef },
    Failed { error: String },
}

impl StatusUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            StatusUpdate::Processing => JobStatus::Processing,
            StatusUpdate::Completed { .. } => JobStatus::Completed,
            StatusUpdate::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Why a transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("status conflict: expected {expected}, found {actual}")]
    Conflict {
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("illegal transition {from} -> {to}")]
    Invalid { from: JobStatus, to: JobStatus },
}

/// A persisted processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: JobId,
    pub request: JobRequest,
    pub status: JobStatus,

    /// Set only when `COMPLETED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<OutputRef>,

    /// Set only when `FAILED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// The failed job this one retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// A fresh `PENDING` job.
    pub fn new(id: JobId, request: JobRequest, retry_of: Option<JobId>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            status: JobStatus::Pending,
            output_ref: None,
            error_message: None,
            retry_of,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.request.kind()
    }

    pub fn input(&self) -> InputRef {
        self.request.input()
    }

    /// Compute the record after a compare-and-set transition.
    ///
    /// `from` must equal the current status, and `from -> update.status()`
    /// must be a legal edge. The returned record is complete: output and
    /// error fields always agree with the new status.
    pub fn apply(
        &self,
        from: JobStatus,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProcessingJob, TransitionError> {
        if self.status != from {
            return Err(TransitionError::Conflict {
                expected: from,
                actual: self.status,
            });
        }
        let to = update.status();
        if !from.can_transition_to(to) {
            return Err(TransitionError::Invalid { from, to });
        }

        let mut next = self.clone();
        next.status = to;
        next.updated_at = now;
        match update {
            StatusUpdate::Processing => {
                next.output_ref = None;
                next.error_message = None;
            }
            StatusUpdate::Completed { output_ref } => {
                next.output_ref = Some(output_ref);
                next.error_message = None;
            }
            StatusUpdate::Failed { error } => {
                next.output_ref = None;
                next.error_message = Some(bounded_message(&error, MAX_ERROR_MESSAGE_LEN));
            }
        }
        Ok(next)
    }

    pub fn snapshot(&self) -> JobStatusSnapshot {
        JobStatusSnapshot {
            status: self.status,
            output_ref: self.output_ref.clone(),
            error: self.error_message.clone(),
        }
    }
}

/// Answer to a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<OutputRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Criteria for listing jobs. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub input: Option<InputRef>,
    #[serde(default)]
    pub updated_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_input(mut self, input: InputRef) -> Self {
        self.input = Some(input);
        self
    }

    pub fn updated_before(mut self, at: DateTime<Utc>) -> Self {
        self.updated_before = Some(at);
        self
    }

    pub fn matches(&self, job: &ProcessingJob) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.kind.map_or(true, |k| job.kind() == k)
            && self.input.as_ref().map_or(true, |i| &job.input() == i)
            && self.updated_before.map_or(true, |t| job.updated_at < t)
    }
}
