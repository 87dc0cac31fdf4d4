//! Job handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use podcaster_models::{
    JobFilter, JobId, JobKind, JobRequest, JobStatus, JobStatusSnapshot, ProcessingJob,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::Submission;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queued: bool,
}

impl From<Submission> for SubmitResponse {
    fn from(submission: Submission) -> Self {
        Self {
            job_id: submission.job.id,
            status: submission.job.status,
            queued: submission.queued,
        }
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    #[serde(flatten)]
    pub snapshot: JobStatusSnapshot,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailRequest {
    pub reason: Option<String>,
}

fn parse_job_id(raw: String) -> ApiResult<JobId> {
    Ok(JobId::parse(raw)?)
}

/// POST /api/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let submission = state.jobs.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(submission.into())))
}

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<ProcessingJob>>> {
    let mut filter = JobFilter::default();
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: JobStatus = status
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Unknown status: {status}")))?;
        filter = filter.with_status(status);
    }
    if let Some(kind) = query.kind.as_deref().filter(|s| !s.is_empty()) {
        let kind: JobKind = kind.parse()?;
        filter = filter.with_kind(kind);
    }
    Ok(Json(state.jobs.list(&filter).await?))
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ProcessingJob>> {
    let job_id = parse_job_id(job_id)?;
    Ok(Json(state.jobs.get(&job_id).await?))
}

/// GET /api/jobs/:job_id/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let job_id = parse_job_id(job_id)?;
    let snapshot = state.jobs.status(&job_id).await?;
    Ok(Json(StatusResponse { job_id, snapshot }))
}

/// POST /api/jobs/:job_id/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let job_id = parse_job_id(job_id)?;
    let submission = state.jobs.retry(&job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(submission.into())))
}

/// POST /api/jobs/:job_id/fail
///
/// Operator action for a job stuck in `PROCESSING`. The body is optional.
pub async fn fail_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<FailRequest>>,
) -> ApiResult<Json<ProcessingJob>> {
    let job_id = parse_job_id(job_id)?;
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(state.jobs.fail(&job_id, reason.as_deref()).await?))
}

/// DELETE /api/jobs/:job_id
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = parse_job_id(job_id)?;
    state.jobs.delete(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
