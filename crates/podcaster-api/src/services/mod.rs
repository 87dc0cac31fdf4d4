//! Business logic behind the HTTP handlers.

pub mod artifacts;
pub mod jobs;
pub mod uploads;

pub use artifacts::{ArtifactResolver, Download, ProcessedArtifact};
pub use jobs::{JobService, Submission};
pub use uploads::UploadService;

use podcaster_models::{InputRef, JobFilter};
use podcaster_storage::StorageError;
use podcaster_store::JobStore;

use crate::error::ApiResult;

/// Fail with `Conflict` while a `PENDING` or `PROCESSING` job reads `input`.
pub(crate) async fn ensure_idle(store: &dyn JobStore, input: InputRef) -> ApiResult<()> {
    let jobs = store.list(&JobFilter::default().with_input(input.clone())).await?;
    if let Some(job) = jobs.iter().find(|job| !job.status.is_terminal()) {
        return Err(StorageError::conflict(format!(
            "{input} is in use by job {} ({})",
            job.id, job.status
        ))
        .into());
    }
    Ok(())
}
