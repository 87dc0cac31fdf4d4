//! Create-then-publish job dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use podcaster_models::{JobFilter, JobId, JobRequest, JobStatus, ProcessingJob, RequestError};
use podcaster_store::{JobStore, StoreError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::QueueError;
use crate::message::JobMessage;
use crate::WorkQueue;

/// Errors returned by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid job request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job row exists and stays `PENDING`; reconciliation re-publishes it.
    #[error("Job {job_id} created but not queued: {source}")]
    Publish {
        job_id: JobId,
        #[source]
        source: QueueError,
    },

    #[error("Job {job_id} is {status}; only FAILED jobs can be retried")]
    NotRetryable { job_id: JobId, status: JobStatus },
}

/// Outcome of one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stale `PENDING` jobs found
    pub scanned: usize,
    /// Re-published successfully
    pub republished: usize,
    /// Skipped because they were re-published recently
    pub skipped: usize,
    /// Publish attempts that failed again
    pub failed: usize,
}

/// Moves created jobs onto the work queue.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    republished: Mutex<HashMap<JobId, Instant>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            store,
            queue,
            republished: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a `PENDING` job and publish it.
    ///
    /// Returns as soon as the message is queued. A publish failure leaves
    /// the row in place and is reported as [`DispatchError::Publish`].
    pub async fn submit(&self, request: JobRequest) -> Result<ProcessingJob, DispatchError> {
        self.submit_inner(request, None).await
    }

    /// Re-run a `FAILED` job under a new id.
    pub async fn retry(&self, failed: &JobId) -> Result<ProcessingJob, DispatchError> {
        let previous = self.store.get(failed).await?;
        if previous.status != JobStatus::Failed {
            return Err(DispatchError::NotRetryable {
                job_id: failed.clone(),
                status: previous.status,
            });
        }
        self.submit_inner(previous.request, Some(previous.id)).await
    }

    async fn submit_inner(
        &self,
        request: JobRequest,
        retry_of: Option<JobId>,
    ) -> Result<ProcessingJob, DispatchError> {
        request.validate()?;
        let job = self.store.create(request, retry_of).await?;

        match self.queue.publish(&JobMessage::for_job(&job)).await {
            Ok(_) => {
                info!(
                    job_id = %job.id,
                    kind = %job.kind(),
                    input = %job.input(),
                    "Job submitted"
                );
                Ok(job)
            }
            Err(source) => {
                warn!(
                    job_id = %job.id,
                    error = %source,
                    "Job created but publish failed; left PENDING for reconciliation"
                );
                Err(DispatchError::Publish {
                    job_id: job.id,
                    source,
                })
            }
        }
    }

    /// Re-publish `PENDING` jobs not updated for `older_than`.
    ///
    /// Jobs this dispatcher re-published within the same window are
    /// skipped so a stopped worker pool does not flood the queue.
    pub async fn reconcile(&self, older_than: Duration) -> Result<ReconcileReport, DispatchError> {
        let mut report = ReconcileReport::default();
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return Ok(report);
        };

        let stale = self
            .store
            .list(
                &JobFilter::default()
                    .with_status(JobStatus::Pending)
                    .updated_before(cutoff),
            )
            .await?;
        report.scanned = stale.len();

        let mut republished = self.republished.lock().await;
        let now = Instant::now();
        republished.retain(|_, at| now.duration_since(*at) < older_than);

        for job in stale {
            if republished.contains_key(&job.id) {
                report.skipped += 1;
                continue;
            }
            match self.queue.publish(&JobMessage::for_job(&job)).await {
                Ok(_) => {
                    info!(job_id = %job.id, created_at = %job.created_at, "Re-published orphaned job");
                    republished.insert(job.id, now);
                    report.republished += 1;
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Failed to re-publish orphaned job");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
