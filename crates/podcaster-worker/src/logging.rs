//! Structured job logging.

use podcaster_models::{JobId, JobKind};
use tracing::{error, info, warn, Span};

/// Logs job lifecycle events with consistent `job_id` and `kind` fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: JobKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, kind = %self.kind, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, kind = %self.kind, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, kind = %self.kind, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span wrapping all work done for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, kind = %self.kind)
    }
}
