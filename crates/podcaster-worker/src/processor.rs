//! Per-message job processing.
//!
//! One delivery runs: claim `PENDING -> PROCESSING`, resolve inputs, let the
//! collaborator write a hidden partial file, commit it with a rename, then
//! record `COMPLETED` or `FAILED`. Transient store and file-system errors are
//! retried per step; anything that survives the retries is returned to the
//! executor, which dead-letters the message.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use podcaster_media::{srt_to_text, Collaborator, MediaError};
use podcaster_models::{
    bounded_message, FileName, JobId, JobRequest, JobStatus, OutputRef, ProcessingJob, Role,
    StatusUpdate, MAX_ERROR_MESSAGE_LEN,
};
use podcaster_queue::JobMessage;
use podcaster_storage::layout::PARTIAL_PREFIX;
use podcaster_storage::{StorageError, StorageLayout};
use podcaster_store::{JobStore, StoreError, StoreResult};
use tokio::fs;
use tracing::{debug, Instrument};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::retry_async;

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Output committed and the job is `COMPLETED`
    Completed(OutputRef),
    /// The job is `FAILED` with this message
    Failed(String),
    /// The job was not ours to run: already claimed, finished or deleted
    Skipped,
    /// Output committed but the job moved on without us
    Orphaned(OutputRef),
}

/// Runs jobs against the store, the file system and a collaborator.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    layout: Arc<StorageLayout>,
    collaborator: Arc<dyn Collaborator>,
    config: WorkerConfig,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        layout: Arc<StorageLayout>,
        collaborator: Arc<dyn Collaborator>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            layout,
            collaborator,
            config,
        }
    }

    /// Process one delivered message.
    ///
    /// `Ok` means the message can be acked. `Err` carries a transient error
    /// that outlived its retries.
    pub async fn process(&self, message: &JobMessage) -> WorkerResult<ProcessOutcome> {
        let logger = JobLogger::new(&message.job_id, message.request.kind());
        self.process_inner(message, &logger)
            .instrument(logger.create_span())
            .await
    }

    async fn process_inner(
        &self,
        message: &JobMessage,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessOutcome> {
        let job = match self
            .transition(&message.job_id, JobStatus::Pending, StatusUpdate::Processing)
            .await
        {
            Ok(job) => job,
            Err(StoreError::Conflict { actual, .. }) => {
                debug!("Job already {}; dropping duplicate delivery", actual);
                metrics::record_job_skipped();
                return Ok(ProcessOutcome::Skipped);
            }
            Err(StoreError::NotFound(_)) => {
                logger.log_warning("job record is gone; dropping delivery");
                metrics::record_job_skipped();
                return Ok(ProcessOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        let kind = job.kind();
        logger.log_start(&job.input().to_string());
        metrics::record_job_started(kind.as_str());
        let started = Instant::now();

        let output = OutputRef::new(
            job.id.clone(),
            FileName::parse(kind.output_file_name(&job.id)).map_err(StorageError::from)?,
        );
        let result = self.execute(&job, &output, logger).await;

        let outcome = match result {
            Ok(()) => self.complete(&job, output, logger).await,
            Err(e) => self.fail(&job, &output, e, logger).await,
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &outcome {
            Ok(ProcessOutcome::Completed(_)) | Ok(ProcessOutcome::Orphaned(_)) => {
                metrics::record_job_completed(kind.as_str(), elapsed)
            }
            Ok(ProcessOutcome::Failed(_)) => metrics::record_job_failed(kind.as_str(), elapsed),
            _ => {}
        }
        metrics::record_job_finished();
        outcome
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        update: StatusUpdate,
    ) -> StoreResult<ProcessingJob> {
        let retry = self.config.retry(&format!("{from} -> {}", update.status()));
        retry_async(&retry, StoreError::is_transient, || {
            self.store.transition(id, from, update.clone())
        })
        .await
    }

    /// Prepare, run the collaborator once, then commit. Only the file-system
    /// and store steps around the collaborator are retried.
    async fn execute(
        &self,
        job: &ProcessingJob,
        output: &OutputRef,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let inputs = retry_async(
            &self.config.retry("prepare job"),
            WorkerError::is_transient,
            || self.prepare(job, output),
        )
        .await?;

        let partial = self.layout.partial_path(output);
        logger.log_progress(&format!("running collaborator on {} input(s)", inputs.len()));
        match &job.request {
            JobRequest::AudioMerge { .. } => {
                self.collaborator.merge_audio(&inputs, &partial).await?
            }
            JobRequest::WaveformVideo { options, .. } => {
                self.collaborator
                    .render_waveform(&inputs[0], &partial, options)
                    .await?
            }
            JobRequest::Transcription { options, .. } => {
                self.collaborator
                    .transcribe(&inputs[0], &partial, options)
                    .await?
            }
        }

        match fs::metadata(&partial).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(MediaError::NoOutput(partial).into()),
        }
        let committed = self.layout.processed_path(output);
        let (from, to) = (&partial, &committed);
        retry_async(
            &self.config.retry("commit output"),
            WorkerError::is_transient,
            || async move { fs::rename(from, to).await.map_err(WorkerError::from) },
        )
        .await?;

        if let Some(name) = job.kind().export_file_name(&job.id) {
            retry_async(
                &self.config.retry("export transcript"),
                WorkerError::is_transient,
                || self.export_transcript(&committed, name.clone()),
            )
            .await?;
        }
        Ok(())
    }

    /// Resolve inputs and clear any partial left by an earlier delivery.
    async fn prepare(&self, job: &ProcessingJob, output: &OutputRef) -> WorkerResult<Vec<PathBuf>> {
        let inputs = self.resolve_inputs(&job.request).await?;
        fs::create_dir_all(self.layout.job_output_dir(&job.id)).await?;
        remove_if_exists(&self.layout.partial_path(output)).await?;
        Ok(inputs)
    }

    /// Input files in play order.
    async fn resolve_inputs(&self, request: &JobRequest) -> WorkerResult<Vec<PathBuf>> {
        match request {
            JobRequest::AudioMerge { session_id } => {
                let session = match self.layout.read_session(session_id).await {
                    Ok(session) => session,
                    Err(StorageError::NotFound(_)) => {
                        return Err(WorkerError::input_unavailable(format!(
                            "upload session {session_id} not found"
                        )))
                    }
                    Err(e) => return Err(e.into()),
                };
                if session.file(Role::Main).is_none() {
                    return Err(WorkerError::input_unavailable(format!(
                        "upload session {session_id} has no main track"
                    )));
                }
                Ok(session
                    .ordered_files()
                    .map(|f| self.layout.role_dir(&f.session_id, f.role).join(f.file_name.as_str()))
                    .collect())
            }
            JobRequest::WaveformVideo { source_job, .. }
            | JobRequest::Transcription { source_job, .. } => {
                Ok(vec![self.source_output(source_job).await?])
            }
        }
    }

    async fn source_output(&self, source: &JobId) -> WorkerResult<PathBuf> {
        let job = match self.store.get(source).await {
            Ok(job) => job,
            Err(StoreError::NotFound(_)) => {
                return Err(WorkerError::input_unavailable(format!(
                    "source job {source} not found"
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if job.status != JobStatus::Completed {
            return Err(WorkerError::input_unavailable(format!(
                "source job {source} is {}",
                job.status
            )));
        }
        if !job.kind().produces_media() {
            return Err(WorkerError::input_unavailable(format!(
                "source job {source} is a {} job and has no media output",
                job.kind()
            )));
        }
        let output = job.output_ref.ok_or_else(|| {
            WorkerError::input_unavailable(format!("source job {source} has no output"))
        })?;

        let path = self.layout.processed_path(&output);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(WorkerError::input_unavailable(format!(
                "output {output} of source job {source} is missing"
            ))),
        }
    }

    /// Copy plain transcript text into the outputs bucket.
    async fn export_transcript(&self, srt_path: &Path, name: String) -> WorkerResult<()> {
        let name = FileName::parse(name).map_err(StorageError::from)?;
        let srt = fs::read(srt_path).await?;
        let text = srt_to_text(&String::from_utf8_lossy(&srt));

        let dest = self.layout.output_path(&name);
        let tmp = dest.with_file_name(format!("{PARTIAL_PREFIX}{name}"));
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &dest).await?;
        Ok(())
    }

    async fn complete(
        &self,
        job: &ProcessingJob,
        output: OutputRef,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessOutcome> {
        let update = StatusUpdate::Completed {
            output_ref: output.clone(),
        };
        match self.transition(&job.id, JobStatus::Processing, update).await {
            Ok(_) => {
                logger.log_completion(&output.to_string());
                Ok(ProcessOutcome::Completed(output))
            }
            Err(StoreError::Conflict { actual, .. }) => {
                logger.log_warning(&format!(
                    "job became {actual} while running; output {output} is orphaned"
                ));
                Ok(ProcessOutcome::Orphaned(output))
            }
            Err(StoreError::NotFound(_)) => {
                logger.log_warning(&format!(
                    "job record deleted while running; output {output} is orphaned"
                ));
                Ok(ProcessOutcome::Orphaned(output))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fail(
        &self,
        job: &ProcessingJob,
        output: &OutputRef,
        error: WorkerError,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessOutcome> {
        self.discard_outputs(job, output).await;

        let message = bounded_message(&error.diagnostic(), MAX_ERROR_MESSAGE_LEN);
        logger.log_error(&message);
        let update = StatusUpdate::Failed {
            error: message.clone(),
        };
        match self.transition(&job.id, JobStatus::Processing, update).await {
            Ok(_) => Ok(ProcessOutcome::Failed(message)),
            Err(StoreError::Conflict { actual, .. }) => {
                logger.log_warning(&format!("job already {actual}; failure not recorded"));
                Ok(ProcessOutcome::Skipped)
            }
            Err(StoreError::NotFound(_)) => Ok(ProcessOutcome::Skipped),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of everything this run may have written.
    async fn discard_outputs(&self, job: &ProcessingJob, output: &OutputRef) {
        let _ = remove_if_exists(&self.layout.partial_path(output)).await;
        let _ = remove_if_exists(&self.layout.processed_path(output)).await;
        if let Some(name) = job
            .kind()
            .export_file_name(&job.id)
            .and_then(|n| FileName::parse(n).ok())
        {
            let _ = remove_if_exists(&self.layout.output_path(&name)).await;
        }
        // only succeeds when nothing else is left in it
        let _ = fs::remove_dir(self.layout.job_output_dir(&job.id)).await;
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
