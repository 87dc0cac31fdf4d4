//! Redis-backed job store.
//!
//! Each job is a JSON string at `<prefix>:job:<id>`; a sorted set at
//! `<prefix>:jobs` indexes ids by creation time. Status changes are a
//! Lua compare-and-set so concurrent writers never overwrite each other.

use async_trait::async_trait;
use chrono::Utc;
use podcaster_models::{JobFilter, JobId, JobRequest, JobStatus, ProcessingJob, StatusUpdate};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::JobStore;

/// Returns 1 when swapped, 0 on status mismatch, -1 when missing.
const CAS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local current = cjson.decode(raw)
if current['status'] ~= ARGV[1] then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// Returns 1 when deleted, 0 on status mismatch, -1 when missing.
const DELETE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local current = cjson.decode(raw)
if current['status'] ~= ARGV[1] then return 0 end
redis.call('DEL', KEYS[1])
redis.call('ZREM', KEYS[2], ARGV[2])
return 1
"#;

const MGET_BATCH: usize = 100;

/// Redis job store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key this store writes
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "podcaster".to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("JOB_KEY_PREFIX")
                .unwrap_or_else(|_| "podcaster".to_string()),
        }
    }
}

/// Job store client.
pub struct RedisJobStore {
    client: redis::Client,
    config: RedisStoreConfig,
    cas: redis::Script,
    delete_script: redis::Script,
}

impl RedisJobStore {
    pub fn new(config: RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            cas: redis::Script::new(CAS_SCRIPT),
            delete_script: redis::Script::new(DELETE_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(RedisStoreConfig::from_env())
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:jobs", self.config.key_prefix)
    }

    async fn current_status(&self, id: &JobId) -> StoreResult<JobStatus> {
        Ok(self.get(id).await?.status)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(
        &self,
        request: JobRequest,
        retry_of: Option<JobId>,
    ) -> StoreResult<ProcessingJob> {
        let job = ProcessingJob::new(JobId::generate(), request, retry_of, Utc::now());
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (created,): (bool,) = redis::pipe()
            .atomic()
            .set_nx(self.job_key(&job.id), &payload)
            .zadd(self.index_key(), job.id.as_str(), job.created_at.timestamp_millis())
            .ignore()
            .query_async(&mut conn)
            .await?;
        if !created {
            return Err(StoreError::Duplicate(job.id));
        }

        debug!(job_id = %job.id, kind = %job.kind(), "Job created");
        Ok(job)
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        update: StatusUpdate,
    ) -> StoreResult<ProcessingJob> {
        let current = self.get(id).await?;
        let next = current
            .apply(from, update, Utc::now())
            .map_err(|e| StoreError::from_transition(id, e))?;
        let payload = serde_json::to_string(&next)?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let swapped: i64 = self
            .cas
            .key(self.job_key(id))
            .arg(from.as_str())
            .arg(&payload)
            .invoke_async(&mut conn)
            .await?;

        match swapped {
            1 => {
                debug!(job_id = %id, from = %from, to = %next.status, "Job transitioned");
                Ok(next)
            }
            0 => Err(StoreError::Conflict {
                job_id: id.clone(),
                expected: from,
                actual: self.current_status(id).await?,
            }),
            _ => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn get(&self, id: &JobId) -> StoreResult<ProcessingJob> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(self.job_key(id)).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<ProcessingJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.index_key(), 0, -1).await?;

        let mut jobs = Vec::new();
        for batch in ids.chunks(MGET_BATCH) {
            let keys: Vec<String> = batch
                .iter()
                .map(|id| format!("{}:job:{}", self.config.key_prefix, id))
                .collect();
            let raws: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await?;
            for raw in raws.into_iter().flatten() {
                match serde_json::from_str::<ProcessingJob>(&raw) {
                    Ok(job) if filter.matches(&job) => jobs.push(job),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping corrupt job record: {}", e),
                }
            }
        }
        Ok(jobs)
    }

    async fn delete(&self, id: &JobId) -> StoreResult<ProcessingJob> {
        let job = self.get(id).await?;
        if !job.status.is_terminal() {
            return Err(StoreError::StillActive {
                job_id: id.clone(),
                status: job.status,
            });
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let deleted: i64 = self
            .delete_script
            .key(self.job_key(id))
            .key(self.index_key())
            .arg(job.status.as_str())
            .arg(id.as_str())
            .invoke_async(&mut conn)
            .await?;

        match deleted {
            1 => {
                debug!(job_id = %id, "Job record deleted");
                Ok(job)
            }
            // terminal statuses never change, so a mismatch means a concurrent delete
            _ => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
