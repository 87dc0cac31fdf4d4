//! Listing, opening and removing stored artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use podcaster_models::{Category, FileName, JobId, Role, SessionId, StoredFile, UploadSession};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::layout::{is_hidden, StorageLayout};

/// One upload session in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub file_count: usize,
    pub total_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// One file under a job's processed directory.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEntry {
    pub job_id: JobId,
    pub file_name: FileName,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// One file in the outputs bucket.
#[derive(Debug, Clone, Serialize)]
pub struct OutputFile {
    pub name: FileName,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

struct DirEntryInfo {
    name: String,
    is_dir: bool,
    size: u64,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

async fn visible_entries(dir: &Path) -> StorageResult<Vec<DirEntryInfo>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::from_io(e, dir.display().to_string()))?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            // removed between read_dir and stat
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let created = meta.created().map(DateTime::from).unwrap_or(modified);
        out.push(DirEntryInfo {
            name,
            is_dir: meta.is_dir(),
            size: meta.len(),
            created,
            modified,
        });
    }
    Ok(out)
}

impl StorageLayout {
    /// All upload sessions, newest first.
    pub async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>> {
        let mut sessions = Vec::new();
        for entry in visible_entries(self.root(Category::Uploads)).await? {
            if !entry.is_dir {
                continue;
            }
            let Ok(id) = SessionId::parse(entry.name) else {
                continue;
            };
            let session = match self.read_session(&id).await {
                Ok(session) => session,
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            sessions.push(SessionSummary {
                session_id: id,
                file_count: session.files.len(),
                total_bytes: session.total_bytes(),
                created_at: entry.created,
            });
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Read one session and its committed files.
    pub async fn read_session(&self, session_id: &SessionId) -> StorageResult<UploadSession> {
        let dir = self.session_dir(session_id);
        let meta = fs::metadata(&dir)
            .await
            .map_err(|e| StorageError::from_io(e, format!("session {session_id}")))?;
        if !meta.is_dir() {
            return Err(StorageError::not_found(format!("session {session_id}")));
        }
        let created_at = meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        let mut files = BTreeMap::new();
        for role in Role::ALL {
            if let Some((file_name, size_bytes)) = self.role_file(session_id, role).await? {
                files.insert(
                    role,
                    StoredFile {
                        session_id: session_id.clone(),
                        role,
                        file_name,
                        size_bytes,
                    },
                );
            }
        }
        Ok(UploadSession {
            id: session_id.clone(),
            files,
            created_at,
        })
    }

    async fn role_file(
        &self,
        session_id: &SessionId,
        role: Role,
    ) -> StorageResult<Option<(FileName, u64)>> {
        let dir = self.role_dir(session_id, role);
        let entries = match visible_entries(&dir).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_dir)
            .max_by_key(|e| e.modified)
            .and_then(|e| FileName::parse(e.name).ok().map(|name| (name, e.size))))
    }

    /// Path of the committed file for a role.
    pub async fn session_file_path(
        &self,
        session_id: &SessionId,
        role: Role,
    ) -> StorageResult<PathBuf> {
        match self.role_file(session_id, role).await? {
            Some((name, _)) => Ok(self.role_dir(session_id, role).join(name.as_str())),
            None => Err(StorageError::not_found(format!(
                "{role} file in session {session_id}"
            ))),
        }
    }

    /// Every committed file under the processed root, newest first.
    pub async fn list_processed(&self) -> StorageResult<Vec<ProcessedEntry>> {
        let mut out = Vec::new();
        for entry in visible_entries(self.root(Category::Processed)).await? {
            if !entry.is_dir {
                continue;
            }
            let Ok(job_id) = JobId::parse(entry.name) else {
                continue;
            };
            match self.job_outputs(&job_id).await {
                Ok(files) => out.extend(files),
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        out.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(out)
    }

    /// Committed files of one job.
    pub async fn job_outputs(&self, job_id: &JobId) -> StorageResult<Vec<ProcessedEntry>> {
        let entries = visible_entries(&self.job_output_dir(job_id)).await?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| {
                Some(ProcessedEntry {
                    job_id: job_id.clone(),
                    file_name: FileName::parse(e.name).ok()?,
                    size_bytes: e.size,
                    modified_at: e.modified,
                })
            })
            .collect())
    }

    /// Files in the outputs bucket, newest first.
    pub async fn list_outputs(&self) -> StorageResult<Vec<OutputFile>> {
        let mut out: Vec<OutputFile> = visible_entries(self.root(Category::Outputs))
            .await?
            .into_iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| {
                Some(OutputFile {
                    name: FileName::parse(e.name).ok()?,
                    size_bytes: e.size,
                    modified_at: e.modified,
                })
            })
            .collect();
        out.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(out)
    }

    /// Open a regular file for streaming. Returns the handle and its length.
    pub async fn open_file(&self, path: &Path) -> StorageResult<(fs::File, u64)> {
        let what = || path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let file = fs::File::open(path)
            .await
            .map_err(|e| StorageError::from_io(e, what()))?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StorageError::not_found(what()));
        }
        Ok((file, meta.len()))
    }

    pub async fn remove_session(&self, session_id: &SessionId) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| StorageError::from_io(e, format!("session {session_id}")))?;
        info!(session_id = %session_id, "Removed upload session");
        Ok(())
    }

    pub async fn remove_session_file(&self, session_id: &SessionId, role: Role) -> StorageResult<()> {
        let path = self.session_file_path(session_id, role).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::from_io(e, format!("{role} file in session {session_id}")))?;
        // a role directory without its file is not worth keeping
        let _ = fs::remove_dir(self.role_dir(session_id, role)).await;
        info!(session_id = %session_id, role = %role, "Removed session file");
        Ok(())
    }

    pub async fn remove_job_outputs(&self, job_id: &JobId) -> StorageResult<()> {
        fs::remove_dir_all(self.job_output_dir(job_id))
            .await
            .map_err(|e| StorageError::from_io(e, format!("outputs of job {job_id}")))?;
        info!(job_id = %job_id, "Removed processed outputs");
        Ok(())
    }

    pub async fn remove_output(&self, name: &FileName) -> StorageResult<()> {
        fs::remove_file(self.output_path(name))
            .await
            .map_err(|e| StorageError::from_io(e, format!("output {name}")))?;
        info!(file = %name, "Removed output file");
        Ok(())
    }
}
