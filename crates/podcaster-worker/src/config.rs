//! Worker configuration.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// How long one consume call blocks waiting for messages
    pub consume_block: Duration,
    /// How often to look for deliveries abandoned by crashed consumers
    pub claim_interval: Duration,
    /// Minimum idle time before another consumer's delivery can be claimed
    pub claim_min_idle: Duration,
    /// How often to sweep for orphaned `PENDING` jobs
    pub reconcile_interval: Duration,
    /// Age after which a `PENDING` job counts as orphaned
    pub reconcile_after: Duration,
    /// Retries for transient store, queue and storage errors
    pub retry_max: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Port for the Prometheus scrape endpoint; disabled when `None`
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            consume_block: Duration::from_millis(1000),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(60),
            reconcile_after: Duration::from_secs(120),
            retry_max: 3,
            retry_base_delay: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let metrics_enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", 2usize).max(1),
            consume_block: Duration::from_millis(env_or("WORKER_CONSUME_BLOCK_MS", 1000)),
            claim_interval: Duration::from_secs(env_or("WORKER_CLAIM_INTERVAL_SECS", 30)),
            claim_min_idle: Duration::from_secs(env_or("WORKER_CLAIM_MIN_IDLE_SECS", 300)),
            reconcile_interval: Duration::from_secs(env_or("WORKER_RECONCILE_INTERVAL_SECS", 60)),
            reconcile_after: Duration::from_secs(env_or("WORKER_RECONCILE_AFTER_SECS", 120)),
            retry_max: env_or("WORKER_RETRY_MAX", 3),
            retry_base_delay: Duration::from_millis(env_or("WORKER_RETRY_BASE_MS", 200)),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 60)),
            metrics_port: metrics_enabled.then(|| env_or("WORKER_METRICS_PORT", 9100)),
        }
    }

    /// Backoff settings for one named operation.
    pub fn retry(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.retry_max)
            .with_base_delay(self.retry_base_delay)
    }
}
