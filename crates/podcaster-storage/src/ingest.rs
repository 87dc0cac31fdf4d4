//! Streaming, size-bounded upload ingestion.
//!
//! Bytes are written to a temp file inside the role directory while a
//! running total is checked against the configured ceiling. Overflow or
//! any stream error drops the temp file; success renames it into place.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use podcaster_models::{FileName, Role, SessionId, StoredFile};
use tempfile::{NamedTempFile, TempPath};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::{StorageConfig, UploadLimit};
use crate::error::{StorageError, StorageResult};
use crate::layout::{is_hidden, StorageLayout, UPLOAD_TEMP_PREFIX};

type CommitKey = (SessionId, Role);

/// Writes upload streams into session directories.
pub struct Ingestor {
    layout: Arc<StorageLayout>,
    limit: UploadLimit,
    chunk_bytes: usize,
    commit_locks: Mutex<HashMap<CommitKey, Arc<Mutex<()>>>>,
}

impl Ingestor {
    pub fn new(layout: Arc<StorageLayout>, config: &StorageConfig) -> Self {
        Self {
            layout,
            limit: config.upload_limit,
            chunk_bytes: config.chunk_bytes,
            commit_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> UploadLimit {
        self.limit
    }

    /// Stream one file into `<session>/<role>/<sanitized name>`.
    ///
    /// The previous file of the role, if any, is replaced. Concurrent
    /// uploads to the same role commit one after another, so the last
    /// committer wins.
    pub async fn ingest<S, B, E>(
        &self,
        session_id: &SessionId,
        role: Role,
        file_name: &str,
        stream: S,
    ) -> StorageResult<StoredFile>
    where
        S: Stream<Item = Result<B, E>> + Send,
        B: AsRef<[u8]> + Send,
        E: Display + Send,
    {
        let name = FileName::sanitize(file_name);
        let role_dir = self.layout.role_dir(session_id, role);

        match self.write_and_commit(session_id, role, &role_dir, &name, stream).await {
            Ok(size_bytes) => {
                info!(
                    session_id = %session_id,
                    role = %role,
                    file_name = %name,
                    size_bytes,
                    "Upload committed"
                );
                Ok(StoredFile {
                    session_id: session_id.clone(),
                    role,
                    file_name: name,
                    size_bytes,
                })
            }
            Err(e) => {
                self.remove_empty_dirs(session_id, &role_dir).await;
                Err(e)
            }
        }
    }

    /// Like [`ingest`](Self::ingest), reading from an `AsyncRead` in
    /// chunks of the configured size.
    pub async fn ingest_reader<R>(
        &self,
        session_id: &SessionId,
        role: Role,
        file_name: &str,
        reader: R,
    ) -> StorageResult<StoredFile>
    where
        R: AsyncRead + Send,
    {
        let stream = ReaderStream::with_capacity(reader, self.chunk_bytes);
        self.ingest(session_id, role, file_name, stream).await
    }

    async fn write_and_commit<S, B, E>(
        &self,
        session_id: &SessionId,
        role: Role,
        role_dir: &Path,
        name: &FileName,
        stream: S,
    ) -> StorageResult<u64>
    where
        S: Stream<Item = Result<B, E>> + Send,
        B: AsRef<[u8]> + Send,
        E: Display + Send,
    {
        let (file, temp_path) = create_temp(role_dir).await?.into_parts();
        let mut out = fs::File::from_std(file);
        let mut written: u64 = 0;

        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::stream(e.to_string()))?;
            let bytes = chunk.as_ref();
            let total = written + bytes.len() as u64;
            if let Some(limit) = self.limit.exceeded_by(total) {
                warn!(
                    session_id = %session_id,
                    role = %role,
                    limit,
                    written,
                    "Upload exceeds size limit, aborting"
                );
                return Err(StorageError::PayloadTooLarge { limit });
            }
            out.write_all(bytes).await?;
            written = total;
        }

        out.flush().await?;
        out.sync_all().await?;
        drop(out);

        self.commit(session_id, role, temp_path, role_dir, name).await?;
        Ok(written)
    }

    async fn commit(
        &self,
        session_id: &SessionId,
        role: Role,
        temp_path: TempPath,
        role_dir: &Path,
        name: &FileName,
    ) -> StorageResult<()> {
        let key = (session_id.clone(), role);
        let lock = {
            let mut locks = self.commit_locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            let dest = role_dir.join(name.as_str());
            match temp_path.persist(&dest) {
                Ok(()) => remove_siblings(role_dir, name).await,
                Err(e) => Err(StorageError::Io(e.error)),
            }
        };

        drop(lock);
        let mut locks = self.commit_locks.lock().await;
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
        result
    }

    async fn remove_empty_dirs(&self, session_id: &SessionId, role_dir: &Path) {
        // remove_dir refuses non-empty directories, which is the check we want
        if fs::remove_dir(role_dir).await.is_ok() {
            debug!(path = %role_dir.display(), "Removed empty role directory");
        }
        let session_dir = self.layout.session_dir(session_id);
        if fs::remove_dir(&session_dir).await.is_ok() {
            debug!(path = %session_dir.display(), "Removed empty session directory");
        }
    }
}

async fn create_temp(dir: &Path) -> StorageResult<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(UPLOAD_TEMP_PREFIX).suffix(".part");

    fs::create_dir_all(dir).await?;
    match builder.tempfile_in(dir) {
        // the directory may have been removed by a failed sibling upload
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).await?;
            Ok(builder.tempfile_in(dir)?)
        }
        other => Ok(other?),
    }
}

async fn remove_siblings(role_dir: &Path, keep: &FileName) -> StorageResult<()> {
    let mut entries = fs::read_dir(role_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_hidden(&name) || name == keep.as_str() {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => debug!(file = %name, "Replaced previous upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
