//! Listing, downloading and deleting stored artifacts.
//!
//! Deletes are refused while an active job still reads the artifact.
//! Downloads hand back an open file so the handler can stream it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use podcaster_models::{
    ArtifactKey, FileName, InputRef, JobId, JobKind, JobStatus, OutputRef, SessionId,
    UploadSession,
};
use podcaster_storage::{OutputFile, SessionSummary, StorageError, StorageLayout};
use podcaster_store::{JobStore, StoreError};
use serde::Serialize;
use tokio::fs;

use super::ensure_idle;
use crate::error::ApiResult;

/// A processed output with whatever the job store still knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedArtifact {
    pub job_id: JobId,
    pub file_name: FileName,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    /// `None` when the job record is gone
    pub kind: Option<JobKind>,
    pub status: Option<JobStatus>,
}

/// An opened artifact ready to stream.
#[derive(Debug)]
pub struct Download {
    pub file: fs::File,
    pub size_bytes: u64,
    pub file_name: FileName,
}

impl Download {
    pub fn content_type(&self) -> &'static str {
        content_type_for(self.file_name.as_str())
    }
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "srt" => "application/x-subrip",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct ArtifactResolver {
    layout: Arc<StorageLayout>,
    store: Arc<dyn JobStore>,
}

impl ArtifactResolver {
    pub fn new(layout: Arc<StorageLayout>, store: Arc<dyn JobStore>) -> Self {
        Self { layout, store }
    }

    pub async fn list_uploads(&self) -> ApiResult<Vec<SessionSummary>> {
        Ok(self.layout.list_sessions().await?)
    }

    pub async fn list_session_files(&self, session_id: &SessionId) -> ApiResult<UploadSession> {
        Ok(self.layout.read_session(session_id).await?)
    }

    /// Processed outputs, newest first, including orphans.
    pub async fn list_processed(&self) -> ApiResult<Vec<ProcessedArtifact>> {
        let entries = self.layout.list_processed().await?;
        let mut jobs: HashMap<JobId, Option<(JobKind, JobStatus)>> = HashMap::new();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if !jobs.contains_key(&entry.job_id) {
                let known = match self.store.get(&entry.job_id).await {
                    Ok(job) => Some((job.kind(), job.status)),
                    Err(StoreError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                };
                jobs.insert(entry.job_id.clone(), known);
            }
            let known = jobs.get(&entry.job_id).copied().flatten();
            out.push(ProcessedArtifact {
                job_id: entry.job_id,
                file_name: entry.file_name,
                size_bytes: entry.size_bytes,
                modified_at: entry.modified_at,
                kind: known.map(|(kind, _)| kind),
                status: known.map(|(_, status)| status),
            });
        }
        Ok(out)
    }

    pub async fn list_outputs(&self) -> ApiResult<Vec<OutputFile>> {
        Ok(self.layout.list_outputs().await?)
    }

    pub async fn download(&self, key: &ArtifactKey) -> ApiResult<Download> {
        let (path, file_name) = match key {
            ArtifactKey::Session(id) => {
                return Err(StorageError::not_found(format!(
                    "session {id} is not a single file; pick a role"
                ))
                .into())
            }
            ArtifactKey::SessionFile { session_id, role } => {
                let path = self.layout.session_file_path(session_id, *role).await?;
                let name = file_name_of(&path)?;
                (path, name)
            }
            ArtifactKey::Processed(job_id) => {
                let name = self.processed_file_name(job_id).await?;
                let path = self
                    .layout
                    .processed_path(&OutputRef::new(job_id.clone(), name.clone()));
                (path, name)
            }
            ArtifactKey::Output(name) => (self.layout.output_path(name), name.clone()),
        };

        let (file, size_bytes) = self.layout.open_file(&path).await?;
        Ok(Download {
            file,
            size_bytes,
            file_name,
        })
    }

    pub async fn delete(&self, key: &ArtifactKey) -> ApiResult<()> {
        match key {
            ArtifactKey::Session(session_id) => {
                ensure_idle(self.store.as_ref(), InputRef::Session(session_id.clone())).await?;
                self.layout.remove_session(session_id).await?;
            }
            ArtifactKey::SessionFile { session_id, role } => {
                ensure_idle(self.store.as_ref(), InputRef::Session(session_id.clone())).await?;
                self.layout.remove_session_file(session_id, *role).await?;
            }
            ArtifactKey::Processed(job_id) => {
                match self.store.get(job_id).await {
                    Ok(job) if !job.status.is_terminal() => {
                        return Err(StorageError::conflict(format!(
                            "job {job_id} is still {}",
                            job.status
                        ))
                        .into());
                    }
                    Ok(_) | Err(StoreError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                ensure_idle(self.store.as_ref(), InputRef::Job(job_id.clone())).await?;
                self.layout.remove_job_outputs(job_id).await?;
            }
            ArtifactKey::Output(name) => self.layout.remove_output(name).await?,
        }
        Ok(())
    }

    /// The committed file of a job: its recorded output, or for orphans
    /// whatever the job directory holds.
    async fn processed_file_name(&self, job_id: &JobId) -> ApiResult<FileName> {
        match self.store.get(job_id).await {
            Ok(job) => {
                if let Some(output) = job.output_ref {
                    return Ok(output.file_name().clone());
                }
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let entries = match self.layout.job_outputs(job_id).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        entries
            .into_iter()
            .max_by_key(|e| e.modified_at)
            .map(|e| e.file_name)
            .ok_or_else(|| StorageError::not_found(format!("outputs of job {job_id}")).into())
    }
}

fn file_name_of(path: &Path) -> ApiResult<FileName> {
    let raw = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::not_found(path.display().to_string()))?;
    Ok(FileName::parse(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use podcaster_models::{JobRequest, Role, StatusUpdate};
    use podcaster_storage::StorageConfig;
    use podcaster_store::MemoryJobStore;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _dir: TempDir,
        layout: Arc<StorageLayout>,
        store: Arc<MemoryJobStore>,
        resolver: ArtifactResolver,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = Arc::new(
            StorageLayout::init(&StorageConfig::with_root(dir.path()))
                .await
                .unwrap(),
        );
        let store = Arc::new(MemoryJobStore::new());
        let resolver = ArtifactResolver::new(layout.clone(), store.clone());
        Fixture {
            _dir: dir,
            layout,
            store,
            resolver,
        }
    }

    fn write_main(layout: &StorageLayout, session: &SessionId, bytes: &[u8]) {
        let dir = layout.role_dir(session, Role::Main);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("take1.wav"), bytes).unwrap();
    }

    fn write_processed(layout: &StorageLayout, job_id: &JobId, name: &str) -> OutputRef {
        let output = OutputRef::new(job_id.clone(), FileName::parse(name).unwrap());
        std::fs::create_dir_all(layout.job_output_dir(job_id)).unwrap();
        std::fs::write(layout.processed_path(&output), b"mp3").unwrap();
        output
    }

    async fn complete(store: &MemoryJobStore, job_id: &JobId, output: OutputRef) {
        store
            .transition(job_id, JobStatus::Pending, StatusUpdate::Processing)
            .await
            .unwrap();
        store
            .transition(
                job_id,
                JobStatus::Processing,
                StatusUpdate::Completed { output_ref: output },
            )
            .await
            .unwrap();
    }

    fn status_of(err: crate::error::ApiError) -> StatusCode {
        err.status_code()
    }

    #[tokio::test]
    async fn test_download_session_file_streams_bytes() {
        let fx = fixture().await;
        let session = SessionId::generate();
        write_main(&fx.layout, &session, b"hello");

        let mut download = fx
            .resolver
            .download(&ArtifactKey::SessionFile {
                session_id: session.clone(),
                role: Role::Main,
            })
            .await
            .unwrap();
        assert_eq!(download.size_bytes, 5);
        assert_eq!(download.file_name.as_str(), "take1.wav");
        assert_eq!(download.content_type(), "audio/wav");
        let mut body = Vec::new();
        download.file.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");

        let err = fx
            .resolver
            .download(&ArtifactKey::SessionFile {
                session_id: session,
                role: Role::Outro,
            })
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_delete_conflicts_while_job_active() {
        let fx = fixture().await;
        let session = SessionId::generate();
        write_main(&fx.layout, &session, b"x");
        let job = fx
            .store
            .create(
                JobRequest::AudioMerge {
                    session_id: session.clone(),
                },
                None,
            )
            .await
            .unwrap();

        let key = ArtifactKey::Session(session.clone());
        let err = fx.resolver.delete(&key).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);
        let err = fx
            .resolver
            .delete(&ArtifactKey::SessionFile {
                session_id: session.clone(),
                role: Role::Main,
            })
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        let output = write_processed(&fx.layout, &job.id, "out.mp3");
        complete(&fx.store, &job.id, output).await;
        fx.resolver.delete(&key).await.unwrap();
        assert_eq!(
            status_of(fx.resolver.list_session_files(&session).await.unwrap_err()),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_processed_delete_conflicts_while_dependent_active() {
        let fx = fixture().await;
        let source = fx
            .store
            .create(
                JobRequest::AudioMerge {
                    session_id: SessionId::generate(),
                },
                None,
            )
            .await
            .unwrap();
        let key = ArtifactKey::Processed(source.id.clone());

        // the source itself is still pending
        let err = fx.resolver.delete(&key).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        let output = write_processed(&fx.layout, &source.id, "merged.mp3");
        complete(&fx.store, &source.id, output).await;
        let waveform = fx
            .store
            .create(
                JobRequest::WaveformVideo {
                    source_job: source.id.clone(),
                    options: Default::default(),
                },
                None,
            )
            .await
            .unwrap();
        let err = fx.resolver.delete(&key).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        fx.store
            .transition(&waveform.id, JobStatus::Pending, StatusUpdate::Processing)
            .await
            .unwrap();
        fx.store
            .transition(
                &waveform.id,
                JobStatus::Processing,
                StatusUpdate::Failed {
                    error: "no".into(),
                },
            )
            .await
            .unwrap();
        fx.resolver.delete(&key).await.unwrap();
        assert!(fx.resolver.list_processed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processed_listing_and_download_include_orphans() {
        let fx = fixture().await;
        let job = fx
            .store
            .create(
                JobRequest::AudioMerge {
                    session_id: SessionId::generate(),
                },
                None,
            )
            .await
            .unwrap();
        let output = write_processed(&fx.layout, &job.id, "kept.mp3");
        complete(&fx.store, &job.id, output).await;

        let orphan = JobId::generate();
        write_processed(&fx.layout, &orphan, "lost.mp3");

        let listed = fx.resolver.list_processed().await.unwrap();
        assert_eq!(listed.len(), 2);
        let known = listed.iter().find(|a| a.job_id == job.id).unwrap();
        assert_eq!(known.kind, Some(JobKind::AudioMerge));
        assert_eq!(known.status, Some(JobStatus::Completed));
        let lost = listed.iter().find(|a| a.job_id == orphan).unwrap();
        assert_eq!(lost.kind, None);

        let download = fx
            .resolver
            .download(&ArtifactKey::Processed(orphan.clone()))
            .await
            .unwrap();
        assert_eq!(download.file_name.as_str(), "lost.mp3");
        assert_eq!(download.content_type(), "audio/mpeg");

        fx.resolver
            .delete(&ArtifactKey::Processed(orphan.clone()))
            .await
            .unwrap();
        let err = fx
            .resolver
            .download(&ArtifactKey::Processed(orphan))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_outputs_bucket() {
        let fx = fixture().await;
        let name = FileName::parse("j1_transcript.txt").unwrap();
        std::fs::write(fx.layout.output_path(&name), b"hello\n").unwrap();

        let listed = fx.resolver.list_outputs().await.unwrap();
        assert_eq!(listed.len(), 1);
        let download = fx
            .resolver
            .download(&ArtifactKey::Output(name.clone()))
            .await
            .unwrap();
        assert_eq!(download.content_type(), "text/plain; charset=utf-8");

        fx.resolver
            .delete(&ArtifactKey::Output(name.clone()))
            .await
            .unwrap();
        let err = fx
            .resolver
            .delete(&ArtifactKey::Output(name))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }
}
