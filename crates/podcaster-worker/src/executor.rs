//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use podcaster_media::Collaborator;
use podcaster_queue::{Delivery, Dispatcher, WorkQueue};
use podcaster_storage::StorageLayout;
use podcaster_store::JobStore;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::{JobProcessor, ProcessOutcome};
use crate::retry::{retry_async, FailureTracker};

/// Most messages taken from the queue in one call.
const MAX_BATCH: usize = 5;

/// Pulls job messages from the queue and runs them with bounded concurrency.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn WorkQueue>,
    processor: Arc<JobProcessor>,
    dispatcher: Arc<Dispatcher>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        layout: Arc<StorageLayout>,
        collaborator: Arc<dyn Collaborator>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            layout,
            collaborator,
            config.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(store, queue.clone()));

        Self {
            config,
            queue,
            processor,
            dispatcher,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`JobExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        retry_async(
            &self.config.retry("queue init"),
            |e: &podcaster_queue::QueueError| e.is_transient(),
            || self.queue.init(),
        )
        .await?;

        let claim_task = self.spawn_claim_task();
        let reconcile_task = self.spawn_reconcile_task();

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut consume_failures = FailureTracker::new(3);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                result = self.consume_jobs() => match result {
                    Ok(()) => consume_failures.record_success(),
                    Err(e) => {
                        if consume_failures.record_failure() {
                            error!("Error consuming jobs: {}", e);
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
        info!("Shutdown signal received, stopping executor");

        claim_task.abort();
        reconcile_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; their deliveries will be reclaimed",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(
                &self.consumer_name,
                self.config.consume_block,
                available.min(MAX_BATCH),
            )
            .await?;
        if deliveries.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} job messages", deliveries.len());

        for delivery in deliveries {
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("job semaphore closed"))?;
            let processor = Arc::clone(&self.processor);
            let queue = Arc::clone(&self.queue);
            let config = self.config.clone();

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_delivery(processor, queue, config, delivery).await;
            });
        }
        Ok(())
    }

    /// Take over deliveries left pending by crashed consumers.
    fn spawn_claim_task(&self) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let processor = Arc::clone(&self.processor);
        let semaphore = Arc::clone(&self.job_semaphore);
        let config = self.config.clone();
        let consumer_name = self.consumer_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let claimed = match queue
                            .claim_stale(&consumer_name, config.claim_min_idle, MAX_BATCH)
                            .await
                        {
                            Ok(claimed) => claimed,
                            Err(e) => {
                                warn!("Failed to claim stale deliveries: {}", e);
                                continue;
                            }
                        };
                        if !claimed.is_empty() {
                            info!("Claimed {} stale deliveries", claimed.len());
                        }
                        for delivery in claimed {
                            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                break;
                            };
                            let processor = Arc::clone(&processor);
                            let queue = Arc::clone(&queue);
                            let config = config.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                Self::execute_delivery(processor, queue, config, delivery).await;
                            });
                        }
                    }
                }
            }
        })
    }

    /// Re-publish `PENDING` jobs whose message never reached the queue.
    fn spawn_reconcile_task(&self) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.reconcile_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match dispatcher.reconcile(config.reconcile_after).await {
                            Ok(report) if report.republished > 0 || report.failed > 0 => {
                                info!(
                                    scanned = report.scanned,
                                    republished = report.republished,
                                    skipped = report.skipped,
                                    failed = report.failed,
                                    "Reconciled orphaned jobs"
                                );
                                metrics::record_orphans_republished(report.republished);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Reconciliation sweep failed: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Process one delivery, then ack it or park it in the dead-letter queue.
    async fn execute_delivery(
        processor: Arc<JobProcessor>,
        queue: Arc<dyn WorkQueue>,
        config: WorkerConfig,
        delivery: Delivery,
    ) {
        let job_id = delivery.message.job_id.clone();

        match processor.process(&delivery.message).await {
            Ok(outcome) => {
                match &outcome {
                    ProcessOutcome::Completed(output) => {
                        debug!(job_id = %job_id, output = %output, "Delivery completed")
                    }
                    ProcessOutcome::Failed(_) => debug!(job_id = %job_id, "Delivery failed the job"),
                    ProcessOutcome::Skipped => debug!(job_id = %job_id, "Delivery skipped"),
                    ProcessOutcome::Orphaned(output) => {
                        warn!(job_id = %job_id, output = %output, "Delivery left an orphaned output")
                    }
                }
                let acked = retry_async(
                    &config.retry("ack"),
                    |e: &podcaster_queue::QueueError| e.is_transient(),
                    || queue.ack(&delivery.id),
                )
                .await;
                if let Err(e) = acked {
                    error!(job_id = %job_id, "Failed to ack delivery {}: {}", delivery.id, e);
                }
            }
            Err(e) => {
                error!(job_id = %job_id, "Job hit a persistent error, moving to DLQ: {}", e);
                let reason = e.to_string();
                let parked = retry_async(
                    &config.retry("dead letter"),
                    |e: &podcaster_queue::QueueError| e.is_transient(),
                    || queue.dead_letter(&delivery, &reason),
                )
                .await;
                match parked {
                    Ok(()) => metrics::record_dead_lettered(),
                    Err(dlq_err) => {
                        error!(job_id = %job_id, "Failed to move delivery to DLQ: {}", dlq_err)
                    }
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{layout, write_session, FakeCollaborator, FlakyStore};
    use podcaster_models::{JobRequest, JobStatus, ProcessingJob, Role};
    use podcaster_queue::MemoryQueue;
    use podcaster_store::MemoryJobStore;
    use std::sync::atomic::Ordering;

    fn config() -> WorkerConfig {
        WorkerConfig {
            max_concurrent_jobs: 2,
            consume_block: Duration::from_millis(20),
            claim_interval: Duration::from_millis(20),
            claim_min_idle: Duration::from_millis(50),
            reconcile_interval: Duration::from_millis(20),
            reconcile_after: Duration::from_millis(50),
            retry_max: 2,
            retry_base_delay: Duration::from_millis(1),
            shutdown_timeout: Duration::from_secs(5),
            metrics_port: None,
        }
    }

    async fn wait_for_status(
        store: &dyn JobStore,
        job: &ProcessingJob,
        status: JobStatus,
    ) -> ProcessingJob {
        for _ in 0..200 {
            let current = store.get(&job.id).await.unwrap();
            if current.status == status {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {status}", job.id);
    }

    #[tokio::test]
    async fn test_runs_submitted_jobs_and_shuts_down() {
        let (_dir, layout) = layout().await;
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let executor = Arc::new(JobExecutor::new(
            WorkerConfig {
                reconcile_after: Duration::from_secs(3600),
                ..config()
            },
            store.clone(),
            queue.clone(),
            layout.clone(),
            Arc::new(FakeCollaborator::default()),
        ));
        assert!(executor.consumer_name().starts_with("worker-"));
        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };

        let dispatcher = Dispatcher::new(store.clone(), queue.clone());
        let mut jobs = Vec::new();
        for _ in 0..4 {
            let session = write_session(&layout, &[(Role::Main, b"B")]);
            jobs.push(
                dispatcher
                    .submit(JobRequest::AudioMerge { session_id: session })
                    .await
                    .unwrap(),
            );
        }
        for job in &jobs {
            let done = wait_for_status(store.as_ref(), job, JobStatus::Completed).await;
            assert!(done.output_ref.is_some());
        }

        executor.shutdown();
        run.await.unwrap().unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_reconciles_orphaned_pending_job() {
        let (_dir, layout) = layout().await;
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryQueue::new());

        // created but never published
        let session = write_session(&layout, &[(Role::Main, b"B")]);
        let orphan = store
            .create(JobRequest::AudioMerge { session_id: session }, None)
            .await
            .unwrap();

        let executor = Arc::new(JobExecutor::new(
            config(),
            store.clone(),
            queue.clone(),
            layout,
            Arc::new(FakeCollaborator::default()),
        ));
        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };

        wait_for_status(store.as_ref(), &orphan, JobStatus::Completed).await;
        executor.shutdown();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_persistent_store_outage_dead_letters() {
        let (_dir, layout) = layout().await;
        let store = Arc::new(FlakyStore::default());
        let queue = Arc::new(MemoryQueue::new());
        let session = write_session(&layout, &[(Role::Main, b"B")]);
        let job = store
            .create(JobRequest::AudioMerge { session_id: session }, None)
            .await
            .unwrap();
        queue
            .publish(&podcaster_queue::JobMessage::for_job(&job))
            .await
            .unwrap();
        store.transition_failures.store(u32::MAX, Ordering::SeqCst);

        let executor = Arc::new(JobExecutor::new(
            WorkerConfig {
                reconcile_interval: Duration::from_secs(3600),
                ..config()
            },
            store.clone(),
            queue.clone(),
            layout,
            Arc::new(FakeCollaborator::default()),
        ));
        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };

        for _ in 0..200 {
            if queue.dead_letter_len().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        executor.shutdown();
        run.await.unwrap().unwrap();

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0.job_id, job.id);
        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Pending);
    }
}
