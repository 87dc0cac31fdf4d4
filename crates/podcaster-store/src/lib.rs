//! Persistent job records with atomic status transitions.
//!
//! This crate provides:
//! - The [`JobStore`] trait
//! - A Redis backend for production
//! - An in-memory backend for tests and single-process runs

pub mod error;
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use podcaster_models::{JobFilter, JobId, JobRequest, JobStatus, ProcessingJob, StatusUpdate};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use redis_store::{RedisJobStore, RedisStoreConfig};

/// Persistent job records.
///
/// `transition` is the only way to mutate a job's status and is a
/// compare-and-set on the persisted status. Implementations write whole
/// records, so readers never see a half-applied transition.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Mint a new job id and persist the job as `PENDING`.
    async fn create(&self, request: JobRequest, retry_of: Option<JobId>)
        -> StoreResult<ProcessingJob>;

    /// Move `id` from `from` to the status carried by `update`.
    ///
    /// Returns [`StoreError::Conflict`] when the persisted status is not
    /// `from`, and [`StoreError::InvalidTransition`] for illegal edges.
    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        update: StatusUpdate,
    ) -> StoreResult<ProcessingJob>;

    async fn get(&self, id: &JobId) -> StoreResult<ProcessingJob>;

    /// Jobs matching `filter`, newest first.
    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<ProcessingJob>>;

    /// Remove a terminal job record. Files are left untouched.
    async fn delete(&self, id: &JobId) -> StoreResult<ProcessingJob>;

    /// Check the backend is reachable.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
