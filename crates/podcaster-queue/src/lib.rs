//! Durable work queue and job dispatch.
//!
//! This crate provides:
//! - The [`WorkQueue`] trait with Redis Streams and in-memory backends
//! - Job messages handed from the API to workers
//! - The [`Dispatcher`]: create-then-publish, explicit retry and the
//!   reconciliation sweep for orphaned `PENDING` jobs

pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod message;
pub mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;

pub use dispatcher::{DispatchError, Dispatcher, ReconcileReport};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use message::{Delivery, JobMessage};
pub use redis_queue::{QueueConfig, RedisQueue};

/// At-least-once work queue with consumer-group semantics.
///
/// A delivered message stays pending until acked or dead-lettered;
/// pending messages idle longer than `min_idle` can be claimed by another
/// consumer.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Prepare the backend (create streams and groups).
    async fn init(&self) -> QueueResult<()>;

    /// Publish a message, returning its delivery id.
    async fn publish(&self, message: &JobMessage) -> QueueResult<String>;

    /// Take up to `count` new messages, waiting at most `block`.
    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Take over messages other consumers left pending for `min_idle`.
    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Park a message in the dead-letter stream and ack the original.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    async fn len(&self) -> QueueResult<u64>;

    async fn dead_letter_len(&self) -> QueueResult<u64>;
}
