//! Messages carried by the work queue.

use chrono::{DateTime, Utc};
use podcaster_models::{JobId, JobRequest, ProcessingJob};
use serde::{Deserialize, Serialize};

/// What a worker needs to run a job: its id and where the input lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub request: JobRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn for_job(job: &ProcessingJob) -> Self {
        Self {
            job_id: job.id.clone(),
            request: job.request.clone(),
            enqueued_at: Utc::now(),
        }
    }
}

/// A message handed to one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Backend-specific id used to ack the message
    pub id: String,
    pub message: JobMessage,
}
