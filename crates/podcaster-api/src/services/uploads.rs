//! Upload sessions.

use std::fmt::Display;
use std::sync::Arc;

use futures_util::Stream;
use podcaster_models::{InputRef, JobFilter, Role, SessionId, StoredFile, UploadSession};
use podcaster_storage::{Ingestor, StorageError, StorageLayout};
use podcaster_store::JobStore;
use tracing::warn;

use crate::error::ApiResult;
use crate::metrics;

#[derive(Clone)]
pub struct UploadService {
    layout: Arc<StorageLayout>,
    ingestor: Arc<Ingestor>,
    store: Arc<dyn JobStore>,
}

impl UploadService {
    pub fn new(layout: Arc<StorageLayout>, ingestor: Arc<Ingestor>, store: Arc<dyn JobStore>) -> Self {
        Self {
            layout,
            ingestor,
            store,
        }
    }

    /// Check that files may be added to an existing session.
    ///
    /// A session is frozen once any job references it, finished or not, so
    /// that retries and re-runs see the same inputs.
    pub async fn ensure_appendable(&self, session_id: &SessionId) -> ApiResult<UploadSession> {
        let session = self.layout.read_session(session_id).await?;
        let filter = JobFilter::default().with_input(InputRef::Session(session_id.clone()));
        if let Some(job) = self.store.list(&filter).await?.first() {
            return Err(StorageError::conflict(format!(
                "session {session_id} is referenced by job {} ({})",
                job.id, job.status
            ))
            .into());
        }
        Ok(session)
    }

    /// Stream one file into the session under `role`.
    pub async fn store_file<S, B, E>(
        &self,
        session_id: &SessionId,
        role: Role,
        file_name: &str,
        stream: S,
    ) -> ApiResult<StoredFile>
    where
        S: Stream<Item = Result<B, E>> + Send,
        B: AsRef<[u8]> + Send,
        E: Display + Send,
    {
        match self.ingestor.ingest(session_id, role, file_name, stream).await {
            Ok(stored) => {
                metrics::record_upload(role.as_str(), stored.size_bytes);
                Ok(stored)
            }
            Err(e) => {
                metrics::record_upload_rejected(match &e {
                    StorageError::PayloadTooLarge { .. } => "too_large",
                    StorageError::Stream(_) => "stream",
                    _ => "storage",
                });
                Err(e.into())
            }
        }
    }

    /// Best-effort removal of a session created by a failed request.
    pub async fn discard(&self, session_id: &SessionId) {
        match self.layout.remove_session(session_id).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to discard upload session"),
        }
    }
}
