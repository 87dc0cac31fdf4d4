//! In-process work queue.
//!
//! Mirrors the consumer-group semantics of the Redis backend: delivered
//! messages stay pending until acked, and idle pending messages can be
//! claimed by another consumer.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::{Delivery, JobMessage};
use crate::WorkQueue;

struct PendingEntry {
    delivery: Delivery,
    consumer: String,
    delivered_at: Instant,
}

#[derive(Default)]
struct State {
    next_id: u64,
    ready: VecDeque<Delivery>,
    pending: HashMap<String, PendingEntry>,
    dead: Vec<(Delivery, String)>,
}

/// Work queue held in memory.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages parked in the dead-letter list with their errors.
    pub async fn dead_letters(&self) -> Vec<(JobMessage, String)> {
        self.state
            .lock()
            .await
            .dead
            .iter()
            .map(|(d, e)| (d.message.clone(), e.clone()))
            .collect()
    }

    /// Number of delivered but unacknowledged messages.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    fn take_ready(state: &mut State, consumer: &str, count: usize) -> Vec<Delivery> {
        let n = count.min(state.ready.len());
        let taken: Vec<Delivery> = state.ready.drain(..n).collect();
        let now = Instant::now();
        for delivery in &taken {
            state.pending.insert(
                delivery.id.clone(),
                PendingEntry {
                    delivery: delivery.clone(),
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
        }
        taken
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn publish(&self, message: &JobMessage) -> QueueResult<String> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = format!("{}-0", state.next_id);
        state.ready.push_back(Delivery {
            id: id.clone(),
            message: message.clone(),
        });
        drop(state);
        self.notify.notify_one();
        debug!(job_id = %message.job_id, message_id = %id, "Published job message");
        Ok(id)
    }

    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let deadline = Instant::now() + block;
        loop {
            {
                let mut state = self.state.lock().await;
                if !state.ready.is_empty() {
                    return Ok(Self::take_ready(&mut state, consumer, count));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            // a stored permit from publish wakes us even if it raced the check
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut claimed = Vec::new();
        for entry in state.pending.values_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(entry.delivered_at) >= min_idle {
                entry.consumer = consumer.to_string();
                entry.delivered_at = now;
                claimed.push(entry.delivery.clone());
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        match state.pending.remove(delivery_id) {
            Some(entry) => {
                debug!(consumer = %entry.consumer, "Acknowledged message: {}", delivery_id);
                Ok(())
            }
            None => Err(QueueError::DeliveryNotFound(delivery_id.to_string())),
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.pending.remove(&delivery.id);
        state.dead.push((delivery.clone(), error.to_string()));
        warn!(job_id = %delivery.message.job_id, "Moved job message to DLQ: {}", error);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.state.lock().await;
        Ok((state.ready.len() + state.pending.len()) as u64)
    }

    async fn dead_letter_len(&self) -> QueueResult<u64> {
        Ok(self.state.lock().await.dead.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podcaster_models::{JobId, JobRequest, SessionId};
    use std::sync::Arc;

    fn message() -> JobMessage {
        JobMessage {
            job_id: JobId::generate(),
            request: JobRequest::AudioMerge {
                session_id: SessionId::generate(),
            },
            enqueued_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_consume_ack() {
        let queue = MemoryQueue::new();
        let msg = message();
        queue.publish(&msg).await.unwrap();

        let deliveries = queue.consume("c1", Duration::ZERO, 10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].message, msg);
        assert_eq!(queue.len().await.unwrap(), 1);

        queue.ack(&deliveries[0].id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
        assert!(queue.ack(&deliveries[0].id).await.is_err());
    }

    #[tokio::test]
    async fn test_consume_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let started = Instant::now();
        let deliveries = queue
            .consume("c1", Duration::from_millis(30), 1)
            .await
            .unwrap();
        assert!(deliveries.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_blocked_consumer_wakes_on_publish() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume("c1", Duration::from_secs(5), 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish(&message()).await.unwrap();

        let deliveries = consumer.await.unwrap().unwrap();
        assert_eq!(deliveries.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_stale_and_dead_letter() {
        let queue = MemoryQueue::new();
        queue.publish(&message()).await.unwrap();
        let first = queue.consume("crashed", Duration::ZERO, 1).await.unwrap();

        let none = queue
            .claim_stale("rescuer", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(none.is_empty());

        let claimed = queue
            .claim_stale("rescuer", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed, first);

        queue.dead_letter(&claimed[0], "gave up").await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
        assert_eq!(queue.dead_letters().await[0].1, "gave up");
    }
}
