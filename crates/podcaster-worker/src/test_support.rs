//! Fakes shared by the worker tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use podcaster_media::{Collaborator, MediaError, MediaResult};
use podcaster_models::{
    JobFilter, JobId, JobRequest, JobStatus, ProcessingJob, Role, SessionId, StatusUpdate,
    TranscriptionOptions, WaveformOptions,
};
use podcaster_storage::layout::PARTIAL_PREFIX;
use podcaster_storage::{StorageConfig, StorageLayout};
use podcaster_store::{JobStore, MemoryJobStore, StoreError, StoreResult};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const FAKE_SRT: &str = "1\n00:00:00,000 --> 00:00:01,500\nHello and welcome.\n\n";

/// Lets a test act while the collaborator is mid-run.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Writes deterministic bytes instead of running external tools.
#[derive(Default)]
pub struct FakeCollaborator {
    pub fail_with: Option<String>,
    pub gate: Option<Gate>,
    pub calls: AtomicUsize,
    /// Put a non-empty directory where the committed output should go.
    pub block_commit: bool,
}

impl FakeCollaborator {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn gated(gate: Gate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn blocking_commit() -> Self {
        Self {
            block_commit: true,
            ..Self::default()
        }
    }

    async fn block_commit_target(&self, output: &Path) -> MediaResult<()> {
        if !self.block_commit {
            return Ok(());
        }
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().trim_start_matches(PARTIAL_PREFIX).to_string())
            .unwrap_or_default();
        let target = output.with_file_name(name);
        tokio::fs::create_dir_all(&target).await?;
        tokio::fs::write(target.join("occupied"), b"x").await?;
        Ok(())
    }

    async fn enter(&self, output: &Path) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(message) = &self.fail_with {
            // leave a partial behind like a crashed encoder would
            tokio::fs::write(output, b"half").await?;
            return Err(MediaError::tool_failed(
                "fake",
                message.clone(),
                Some("frame=1 size=0kB\nconversion failed".to_string()),
                Some(1),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Collaborator for FakeCollaborator {
    async fn merge_audio(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        self.enter(output).await?;
        let mut merged = Vec::new();
        for input in inputs {
            merged.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, merged).await?;
        self.block_commit_target(output).await
    }

    async fn render_waveform(
        &self,
        audio: &Path,
        output: &Path,
        _options: &WaveformOptions,
    ) -> MediaResult<()> {
        self.enter(output).await?;
        let mut video = b"waveform:".to_vec();
        video.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, video).await?;
        Ok(())
    }

    async fn transcribe(
        &self,
        audio: &Path,
        output: &Path,
        _options: &TranscriptionOptions,
    ) -> MediaResult<()> {
        self.enter(output).await?;
        tokio::fs::metadata(audio).await?;
        tokio::fs::write(output, FAKE_SRT).await?;
        Ok(())
    }
}

/// Memory store whose transitions fail transiently a set number of times.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    pub transition_failures: AtomicU32,
}

pub fn transient_store_error() -> StoreError {
    StoreError::Redis(redis::RedisError::from(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    )))
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create(
        &self,
        request: JobRequest,
        retry_of: Option<JobId>,
    ) -> StoreResult<ProcessingJob> {
        self.inner.create(request, retry_of).await
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        update: StatusUpdate,
    ) -> StoreResult<ProcessingJob> {
        let left = self.transition_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.transition_failures.store(left - 1, Ordering::SeqCst);
            return Err(transient_store_error());
        }
        self.inner.transition(id, from, update).await
    }

    async fn get(&self, id: &JobId) -> StoreResult<ProcessingJob> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<ProcessingJob>> {
        self.inner.list(filter).await
    }

    async fn delete(&self, id: &JobId) -> StoreResult<ProcessingJob> {
        self.inner.delete(id).await
    }
}

pub async fn layout() -> (TempDir, Arc<StorageLayout>) {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::init(&StorageConfig::with_root(dir.path()))
        .await
        .unwrap();
    (dir, Arc::new(layout))
}

/// Create a session with the given role files written directly to disk.
pub fn write_session(layout: &StorageLayout, files: &[(Role, &[u8])]) -> SessionId {
    let session = SessionId::generate();
    std::fs::create_dir_all(layout.session_dir(&session)).unwrap();
    for (role, bytes) in files {
        let dir = layout.role_dir(&session, *role);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.wav", role.as_str())), bytes).unwrap();
    }
    session
}
