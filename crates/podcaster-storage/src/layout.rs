//! Directory conventions for the three storage categories.
//!
//! ```text
//! <uploads>/<session_id>/<role>/<file name>
//! <processed>/<job_id>/<file name>
//! <outputs>/<file name>
//! ```
//!
//! Every identifier reaching this module is already a validated type, so
//! joined paths can never leave their category root.

use std::path::{Path, PathBuf};

use podcaster_models::{Category, FileName, JobId, OutputRef, Role, SessionId};
use tokio::fs;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// Prefix of in-flight upload temp files.
pub const UPLOAD_TEMP_PREFIX: &str = ".upload-";
/// Prefix of in-flight job outputs.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Hidden entries (temp files, probes) are never listed or served.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Validated storage roots.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    uploads: PathBuf,
    processed: PathBuf,
    outputs: PathBuf,
}

impl StorageLayout {
    /// Create missing roots and verify each one is a writable directory.
    ///
    /// Fails with [`StorageError::Config`] on the first unusable root.
    pub async fn init(config: &StorageConfig) -> StorageResult<Self> {
        let layout = Self {
            uploads: config.uploads_dir.clone(),
            processed: config.processed_dir.clone(),
            outputs: config.outputs_dir.clone(),
        };
        for category in [Category::Uploads, Category::Processed, Category::Outputs] {
            ensure_writable_dir(category, layout.root(category)).await?;
        }
        info!(
            uploads = %layout.uploads.display(),
            processed = %layout.processed.display(),
            outputs = %layout.outputs.display(),
            "Storage layout ready"
        );
        Ok(layout)
    }

    pub fn root(&self, category: Category) -> &Path {
        match category {
            Category::Uploads => &self.uploads,
            Category::Processed => &self.processed,
            Category::Outputs => &self.outputs,
        }
    }

    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.uploads.join(session_id.as_str())
    }

    pub fn role_dir(&self, session_id: &SessionId, role: Role) -> PathBuf {
        self.session_dir(session_id).join(role.as_str())
    }

    pub fn job_output_dir(&self, job_id: &JobId) -> PathBuf {
        self.processed.join(job_id.as_str())
    }

    pub fn processed_path(&self, output: &OutputRef) -> PathBuf {
        self.job_output_dir(output.job_id())
            .join(output.file_name().as_str())
    }

    /// Where a collaborator writes before the output is committed.
    pub fn partial_path(&self, output: &OutputRef) -> PathBuf {
        self.job_output_dir(output.job_id())
            .join(format!("{PARTIAL_PREFIX}{}", output.file_name()))
    }

    pub fn output_path(&self, name: &FileName) -> PathBuf {
        self.outputs.join(name.as_str())
    }
}

async fn ensure_writable_dir(category: Category, path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path).await.map_err(|e| {
        StorageError::config(format!(
            "cannot create {category} root {}: {e}",
            path.display()
        ))
    })?;

    let meta = fs::metadata(path).await.map_err(|e| {
        StorageError::config(format!("cannot stat {category} root {}: {e}", path.display()))
    })?;
    if !meta.is_dir() {
        return Err(StorageError::config(format!(
            "{category} root {} is not a directory",
            path.display()
        )));
    }

    let probe = path.join(format!(".write-probe-{}", std::process::id()));
    fs::write(&probe, b"").await.map_err(|e| {
        StorageError::config(format!("{category} root {} is not writable: {e}", path.display()))
    })?;
    match fs::remove_file(&probe).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::config(format!(
            "cannot clean up probe in {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_missing_roots() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::with_root(dir.path().join("data"));
        let layout = StorageLayout::init(&config).await.unwrap();

        for category in [Category::Uploads, Category::Processed, Category::Outputs] {
            let root = layout.root(category);
            assert!(root.is_dir());
            assert_eq!(std::fs::read_dir(root).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_init_fails_fast_on_file_root() {
        let dir = TempDir::new().unwrap();
        let mut config = StorageConfig::with_root(dir.path());
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        config.processed_dir = blocker;

        let err = StorageLayout::init(&config).await.unwrap_err();
        assert!(matches!(err, StorageError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_paths_are_deterministic() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::init(&StorageConfig::with_root(dir.path()))
            .await
            .unwrap();
        let session = SessionId::parse("s1").unwrap();
        let job = JobId::parse("j1").unwrap();
        let output = OutputRef::new(job.clone(), FileName::parse("j1.srt").unwrap());

        assert_eq!(
            layout.role_dir(&session, Role::Main),
            dir.path().join("uploads/s1/main")
        );
        assert_eq!(
            layout.processed_path(&output),
            dir.path().join("processed/j1/j1.srt")
        );
        assert_eq!(
            layout.partial_path(&output),
            dir.path().join("processed/j1/.partial-j1.srt")
        );
        assert_eq!(layout.job_output_dir(&job), dir.path().join("processed/j1"));
    }
}
