//! Work queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::{Delivery, JobMessage};
use crate::WorkQueue;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "podcaster:jobs".to_string(),
            consumer_group: "podcaster:workers".to_string(),
            dlq_stream_name: "podcaster:dlq".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "podcaster:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "podcaster:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "podcaster:dlq".to_string()),
        }
    }
}

/// Redis Streams queue client.
pub struct RedisQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisQueue {
    /// Create a new queue client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Decode stream entries, acking any that cannot be parsed.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            let message_id = entry.id.clone();
            let parsed = match entry.map.get("job") {
                Some(redis::Value::BulkString(payload)) => {
                    serde_json::from_slice::<JobMessage>(payload).map_err(|e| e.to_string())
                }
                _ => Err("missing job field".to_string()),
            };
            match parsed {
                Ok(message) => {
                    debug!(job_id = %message.job_id, message_id = %message_id, "Consumed job message");
                    deliveries.push(Delivery {
                        id: message_id,
                        message,
                    });
                }
                Err(e) => {
                    warn!(message_id = %message_id, "Failed to parse job payload: {}", e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack(&message_id).await.ok();
                }
            }
        }
        deliveries
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn publish(&self, message: &JobMessage) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(message)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("kind")
            .arg(message.request.kind().as_str())
            .query_async(&mut conn)
            .await?;

        info!(job_id = %message.job_id, message_id = %message_id, "Published job message");
        Ok(message_id)
    }

    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let result: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries: Vec<StreamId> = result
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default();
        Ok(self.decode_entries(entries).await)
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let claimed = self.decode_entries(reply.claimed).await;
        if !claimed.is_empty() {
            info!(consumer, count = claimed.len(), "Claimed stale job messages");
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", delivery_id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&delivery.message)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.id)
            .query_async::<()>(&mut conn)
            .await?;

        // Ack the original message
        self.ack(&delivery.id).await?;

        warn!(job_id = %delivery.message.job_id, "Moved job message to DLQ: {}", error);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    async fn dead_letter_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }
}
