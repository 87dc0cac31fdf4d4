//! Storage configuration.

use std::path::PathBuf;

/// Default per-file upload ceiling: 500 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Default read/write chunk size for streaming ingestion.
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

/// Per-file upload ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadLimit {
    Unlimited,
    Bytes(u64),
}

impl UploadLimit {
    /// `0` is the unlimited sentinel.
    pub fn from_bytes(bytes: u64) -> Self {
        if bytes == 0 {
            UploadLimit::Unlimited
        } else {
            UploadLimit::Bytes(bytes)
        }
    }

    /// Returns the configured ceiling when `total` exceeds it.
    pub fn exceeded_by(&self, total: u64) -> Option<u64> {
        match *self {
            UploadLimit::Unlimited => None,
            UploadLimit::Bytes(limit) if total > limit => Some(limit),
            UploadLimit::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<u64> {
        match *self {
            UploadLimit::Unlimited => None,
            UploadLimit::Bytes(limit) => Some(limit),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Per-session upload originals
    pub uploads_dir: PathBuf,
    /// Per-job processed outputs
    pub processed_dir: PathBuf,
    /// Flat outputs bucket
    pub outputs_dir: PathBuf,
    /// Per-file upload ceiling
    pub upload_limit: UploadLimit,
    /// Chunk size used when reading from `AsyncRead` sources
    pub chunk_bytes: usize,
}

impl StorageConfig {
    /// All three roots under one data directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            uploads_dir: root.join("uploads"),
            processed_dir: root.join("processed"),
            outputs_dir: root.join("outputs"),
            upload_limit: UploadLimit::Bytes(DEFAULT_MAX_UPLOAD_BYTES),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    pub fn with_upload_limit(mut self, limit: UploadLimit) -> Self {
        self.upload_limit = limit;
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let root = std::env::var("DATA_ROOT").unwrap_or_else(|_| "/data".to_string());
        let defaults = Self::with_root(root);
        Self {
            uploads_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_dir),
            processed_dir: std::env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.processed_dir),
            outputs_dir: std::env::var("OUTPUTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.outputs_dir),
            upload_limit: UploadLimit::from_bytes(
                std::env::var("MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            ),
            chunk_bytes: std::env::var("UPLOAD_CHUNK_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_CHUNK_BYTES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unlimited() {
        assert_eq!(UploadLimit::from_bytes(0), UploadLimit::Unlimited);
        assert_eq!(UploadLimit::Unlimited.exceeded_by(u64::MAX), None);
    }

    #[test]
    fn test_limit_is_inclusive() {
        let limit = UploadLimit::from_bytes(10);
        assert_eq!(limit.exceeded_by(10), None);
        assert_eq!(limit.exceeded_by(11), Some(10));
    }

    #[test]
    fn test_with_root() {
        let config = StorageConfig::with_root("/srv/podcaster");
        assert_eq!(config.uploads_dir, PathBuf::from("/srv/podcaster/uploads"));
        assert_eq!(config.processed_dir, PathBuf::from("/srv/podcaster/processed"));
        assert_eq!(config.outputs_dir, PathBuf::from("/srv/podcaster/outputs"));
    }
}
