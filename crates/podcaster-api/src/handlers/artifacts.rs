//! Artifact listing, download and delete handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use podcaster_models::{ArtifactKey, Category, SessionId, UploadSession};
use podcaster_storage::{OutputFile, SessionSummary};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::ApiResult;
use crate::services::{Download, ProcessedArtifact};
use crate::state::AppState;

fn stream_download(download: Download) -> Response {
    let headers = [
        (header::CONTENT_TYPE, download.content_type().to_string()),
        (header::CONTENT_LENGTH, download.size_bytes.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        ),
    ];
    let body = Body::from_stream(ReaderStream::new(download.file));
    (StatusCode::OK, headers, body).into_response()
}

async fn download(state: &AppState, category: Category, raw: &str) -> ApiResult<Response> {
    let key = ArtifactKey::parse(category, raw)?;
    let download = state.artifacts.download(&key).await?;
    Ok(stream_download(download))
}

async fn delete(state: &AppState, category: Category, raw: &str) -> ApiResult<StatusCode> {
    let key = ArtifactKey::parse(category, raw)?;
    state.artifacts.delete(&key).await?;
    info!(artifact = %key, "Artifact deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/uploads
pub async fn list_uploads(State(state): State<AppState>) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state.artifacts.list_uploads().await?))
}

/// GET /api/uploads/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<UploadSession>> {
    let session_id = SessionId::parse(session_id)?;
    Ok(Json(state.artifacts.list_session_files(&session_id).await?))
}

/// DELETE /api/uploads/:session_id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    delete(&state, Category::Uploads, &session_id).await
}

/// GET /api/uploads/:session_id/:role
pub async fn download_session_file(
    State(state): State<AppState>,
    Path((session_id, role)): Path<(String, String)>,
) -> ApiResult<Response> {
    download(&state, Category::Uploads, &format!("{session_id}/{role}")).await
}

/// DELETE /api/uploads/:session_id/:role
pub async fn delete_session_file(
    State(state): State<AppState>,
    Path((session_id, role)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    delete(&state, Category::Uploads, &format!("{session_id}/{role}")).await
}

/// GET /api/processed
pub async fn list_processed(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ProcessedArtifact>>> {
    Ok(Json(state.artifacts.list_processed().await?))
}

/// GET /api/processed/:job_id
pub async fn download_processed(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    download(&state, Category::Processed, &job_id).await
}

/// DELETE /api/processed/:job_id
pub async fn delete_processed(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    delete(&state, Category::Processed, &job_id).await
}

/// GET /api/outputs
pub async fn list_outputs(State(state): State<AppState>) -> ApiResult<Json<Vec<OutputFile>>> {
    Ok(Json(state.artifacts.list_outputs().await?))
}

/// GET /api/outputs/:name
pub async fn download_output(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    download(&state, Category::Outputs, &name).await
}

/// DELETE /api/outputs/:name
pub async fn delete_output(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    delete(&state, Category::Outputs, &name).await
}
