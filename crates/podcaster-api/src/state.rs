//! Application state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use podcaster_queue::{Dispatcher, RedisQueue, WorkQueue};
use podcaster_storage::{Ingestor, StorageConfig, StorageLayout};
use podcaster_store::{JobStore, RedisJobStore};
use tracing::info;

use crate::config::ApiConfig;
use crate::services::{ArtifactResolver, JobService, UploadService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub layout: Arc<StorageLayout>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub uploads: UploadService,
    pub jobs: JobService,
    pub artifacts: ArtifactResolver,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create application state from the environment.
    ///
    /// Fails when the storage roots are unusable or Redis cannot be reached.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage_config = StorageConfig::from_env();
        let layout = StorageLayout::init(&storage_config).await?;

        let store = RedisJobStore::from_env()?;
        store.ping().await?;
        let queue = RedisQueue::from_env()?;
        queue.init().await?;

        Ok(Self::from_parts(
            config,
            &storage_config,
            Arc::new(layout),
            Arc::new(store),
            Arc::new(queue),
        ))
    }

    /// Assemble state from already-built backends.
    pub fn from_parts(
        config: ApiConfig,
        storage_config: &StorageConfig,
        layout: Arc<StorageLayout>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        let ingestor = Arc::new(Ingestor::new(layout.clone(), storage_config));
        info!(upload_limit = ?ingestor.limit(), "Upload ingestor ready");
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone()));

        Self {
            config,
            uploads: UploadService::new(layout.clone(), ingestor, store.clone()),
            jobs: JobService::new(layout.clone(), store.clone(), dispatcher),
            artifacts: ArtifactResolver::new(layout.clone(), store.clone()),
            layout,
            store,
            queue,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
