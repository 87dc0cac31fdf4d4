//! Job submission, polling and operator actions.

use std::sync::Arc;

use podcaster_models::{
    JobFilter, JobId, JobRequest, JobStatus, JobStatusSnapshot, ProcessingJob, Role, StatusUpdate,
};
use podcaster_queue::{DispatchError, Dispatcher};
use podcaster_storage::StorageLayout;
use podcaster_store::JobStore;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// A job accepted for processing.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: ProcessingJob,
    /// `false` when the row exists but its message did not reach the
    /// queue; the reconciliation sweep will publish it.
    pub queued: bool,
}

#[derive(Clone)]
pub struct JobService {
    layout: Arc<StorageLayout>,
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
}

impl JobService {
    pub fn new(
        layout: Arc<StorageLayout>,
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            layout,
            store,
            dispatcher,
        }
    }

    pub async fn submit(&self, request: JobRequest) -> ApiResult<Submission> {
        request.validate()?;
        self.check_inputs(&request).await?;
        let result = self.dispatcher.submit(request).await;
        self.accept(result).await
    }

    /// Resubmit a `FAILED` job's request as a new job.
    pub async fn retry(&self, id: &JobId) -> ApiResult<Submission> {
        let previous = self.store.get(id).await?;
        if previous.status != JobStatus::Failed {
            return Err(DispatchError::NotRetryable {
                job_id: previous.id,
                status: previous.status,
            }
            .into());
        }
        self.check_inputs(&previous.request).await?;
        let result = self.dispatcher.retry(id).await;
        self.accept(result).await
    }

    pub async fn get(&self, id: &JobId) -> ApiResult<ProcessingJob> {
        Ok(self.store.get(id).await?)
    }

    pub async fn status(&self, id: &JobId) -> ApiResult<JobStatusSnapshot> {
        Ok(self.store.get(id).await?.snapshot())
    }

    pub async fn list(&self, filter: &JobFilter) -> ApiResult<Vec<ProcessingJob>> {
        Ok(self.store.list(filter).await?)
    }

    /// Operator compensation for a job stuck in `PROCESSING`.
    ///
    /// The worker may still be running; its final transition will lose
    /// the compare-and-set and its output is left as an orphan.
    pub async fn fail(&self, id: &JobId, reason: Option<&str>) -> ApiResult<ProcessingJob> {
        let error = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Marked failed by operator: {reason}"),
            None => "Marked failed by operator".to_string(),
        };
        let job = self
            .store
            .transition(id, JobStatus::Processing, StatusUpdate::Failed { error })
            .await?;
        warn!(job_id = %id, kind = %job.kind(), "Job marked failed by operator");
        Ok(job)
    }

    /// Remove a terminal job record. Its files stay until deleted.
    pub async fn delete(&self, id: &JobId) -> ApiResult<ProcessingJob> {
        let job = self.store.delete(id).await?;
        info!(job_id = %id, status = %job.status, "Job record deleted");
        Ok(job)
    }

    /// Preconditions the dispatcher leaves to its caller.
    async fn check_inputs(&self, request: &JobRequest) -> ApiResult<()> {
        match request {
            JobRequest::AudioMerge { session_id } => {
                let session = self.layout.read_session(session_id).await?;
                if session.file(Role::Main).is_none() {
                    return Err(ApiError::bad_request(format!(
                        "Session {session_id} has no main track"
                    )));
                }
            }
            JobRequest::WaveformVideo { source_job, .. }
            | JobRequest::Transcription { source_job, .. } => {
                let source = self.store.get(source_job).await?;
                if !source.kind().produces_media() {
                    return Err(ApiError::bad_request(format!(
                        "Source job {source_job} is a {} job and has no audio output",
                        source.kind()
                    )));
                }
                if source.status != JobStatus::Completed {
                    return Err(ApiError::conflict(format!(
                        "Source job {source_job} is {}, expected COMPLETED",
                        source.status
                    )));
                }
            }
        }
        Ok(())
    }

    async fn accept(&self, result: Result<ProcessingJob, DispatchError>) -> ApiResult<Submission> {
        match result {
            Ok(job) => {
                metrics::record_job_submitted(job.kind().as_str());
                Ok(Submission { job, queued: true })
            }
            Err(DispatchError::Publish { job_id, source }) => {
                warn!(job_id = %job_id, error = %source, "Job accepted without a queue message");
                let job = self.store.get(&job_id).await?;
                metrics::record_job_unqueued(job.kind().as_str());
                Ok(Submission { job, queued: false })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use podcaster_models::{FileName, OutputRef, SessionId, TranscriptionOptions};
    use podcaster_queue::{MemoryQueue, WorkQueue};
    use podcaster_storage::StorageConfig;
    use podcaster_store::MemoryJobStore;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        layout: Arc<StorageLayout>,
        store: Arc<MemoryJobStore>,
        queue: Arc<MemoryQueue>,
        jobs: JobService,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = Arc::new(
            StorageLayout::init(&StorageConfig::with_root(dir.path()))
                .await
                .unwrap(),
        );
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone()));
        let jobs = JobService::new(layout.clone(), store.clone(), dispatcher);
        Fixture {
            _dir: dir,
            layout,
            store,
            queue,
            jobs,
        }
    }

    fn session_with(layout: &StorageLayout, roles: &[Role]) -> SessionId {
        let session = SessionId::generate();
        for role in roles {
            let dir = layout.role_dir(&session, *role);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{role}.wav")), b"x").unwrap();
        }
        session
    }

    async fn run_to(store: &MemoryJobStore, id: &JobId, update: StatusUpdate) -> ProcessingJob {
        store
            .transition(id, JobStatus::Pending, StatusUpdate::Processing)
            .await
            .unwrap();
        store.transition(id, JobStatus::Processing, update).await.unwrap()
    }

    #[tokio::test]
    async fn test_merge_requires_session_with_main() {
        let fx = fixture().await;

        let err = fx
            .jobs
            .submit(JobRequest::AudioMerge {
                session_id: SessionId::generate(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let intro_only = session_with(&fx.layout, &[Role::Intro]);
        let err = fx
            .jobs
            .submit(JobRequest::AudioMerge {
                session_id: intro_only,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(fx.store.list(&JobFilter::default()).await.unwrap().is_empty());

        let session = session_with(&fx.layout, &[Role::Main]);
        let accepted = fx
            .jobs
            .submit(JobRequest::AudioMerge { session_id: session })
            .await
            .unwrap();
        assert!(accepted.queued);
        assert_eq!(accepted.job.status, JobStatus::Pending);
        assert_eq!(fx.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dependent_job_requires_completed_media_source() {
        let fx = fixture().await;
        let session = session_with(&fx.layout, &[Role::Main]);
        let merge = fx
            .jobs
            .submit(JobRequest::AudioMerge { session_id: session })
            .await
            .unwrap()
            .job;
        let transcribe = |source_job: JobId| JobRequest::Transcription {
            source_job,
            options: TranscriptionOptions::default(),
        };

        let err = fx.jobs.submit(transcribe(merge.id.clone())).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let output = OutputRef::new(merge.id.clone(), FileName::parse("m.mp3").unwrap());
        run_to(&fx.store, &merge.id, StatusUpdate::Completed { output_ref: output }).await;
        let transcript = fx.jobs.submit(transcribe(merge.id.clone())).await.unwrap().job;

        let output = OutputRef::new(transcript.id.clone(), FileName::parse("t.srt").unwrap());
        run_to(&fx.store, &transcript.id, StatusUpdate::Completed { output_ref: output }).await;
        let err = fx.jobs.submit(transcribe(transcript.id)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = fx.jobs.submit(transcribe(JobId::generate())).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_operator_fail_and_retry() {
        let fx = fixture().await;
        let session = session_with(&fx.layout, &[Role::Main]);
        let job = fx
            .jobs
            .submit(JobRequest::AudioMerge { session_id: session })
            .await
            .unwrap()
            .job;

        // only PROCESSING jobs can be failed by hand
        let err = fx.jobs.fail(&job.id, None).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let err = fx.jobs.retry(&job.id).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        fx.store
            .transition(&job.id, JobStatus::Pending, StatusUpdate::Processing)
            .await
            .unwrap();
        let failed = fx.jobs.fail(&job.id, Some(" stuck ")).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("Marked failed by operator: stuck")
        );
        let snapshot = fx.jobs.status(&job.id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);

        let retried = fx.jobs.retry(&job.id).await.unwrap();
        assert_ne!(retried.job.id, job.id);
        assert_eq!(retried.job.retry_of.as_ref(), Some(&job.id));

        let err = fx.jobs.delete(&retried.job.id).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        fx.jobs.delete(&job.id).await.unwrap();
        let err = fx.jobs.get(&job.id).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let fx = fixture().await;
        let session = session_with(&fx.layout, &[Role::Main]);
        let first = fx
            .jobs
            .submit(JobRequest::AudioMerge {
                session_id: session.clone(),
            })
            .await
            .unwrap()
            .job;
        tokio::time::sleep(Duration::from_millis(5)).await;
        fx.jobs
            .submit(JobRequest::AudioMerge { session_id: session })
            .await
            .unwrap();
        run_to(
            &fx.store,
            &first.id,
            StatusUpdate::Failed {
                error: "boom".into(),
            },
        )
        .await;

        let all = fx.jobs.list(&JobFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        let failed = fx
            .jobs
            .list(&JobFilter::default().with_status(JobStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, first.id);
    }
}
