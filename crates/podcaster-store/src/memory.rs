//! In-memory job store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use podcaster_models::{JobFilter, JobId, JobRequest, JobStatus, ProcessingJob, StatusUpdate};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::JobStore;

/// Job store backed by a map behind an async `RwLock`.
///
/// Transitions run under the write lock, which makes the compare and the
/// set a single step.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, ProcessingJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(
        &self,
        request: JobRequest,
        retry_of: Option<JobId>,
    ) -> StoreResult<ProcessingJob> {
        let job = ProcessingJob::new(JobId::generate(), request, retry_of, Utc::now());
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id.clone(), job.clone());
        debug!(job_id = %job.id, kind = %job.kind(), "Job created");
        Ok(job)
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        update: StatusUpdate,
    ) -> StoreResult<ProcessingJob> {
        let mut jobs = self.jobs.write().await;
        let current = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let next = current
            .apply(from, update, Utc::now())
            .map_err(|e| StoreError::from_transition(id, e))?;
        *current = next.clone();
        Ok(next)
    }

    async fn get(&self, id: &JobId) -> StoreResult<ProcessingJob> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<ProcessingJob>> {
        let mut out: Vec<ProcessingJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete(&self, id: &JobId) -> StoreResult<ProcessingJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !job.status.is_terminal() {
            return Err(StoreError::StillActive {
                job_id: id.clone(),
                status: job.status,
            });
        }
        jobs.remove(id).ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
