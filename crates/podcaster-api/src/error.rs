//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use podcaster_models::{IdentifierError, RequestError};
use podcaster_queue::{DispatchError, QueueError};
use podcaster_storage::StorageError;
use podcaster_store::StoreError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<IdentifierError> for ApiError {
    fn from(err: IdentifierError) -> Self {
        Self::BadRequest(format!("Invalid identifier: {err}"))
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self::BadRequest(format!("Invalid job request: {err}"))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) | ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(e) => storage_status(e),
            ApiError::Store(e) => store_status(e),
            ApiError::Dispatch(e) => match e {
                DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                DispatchError::Store(e) => store_status(e),
                DispatchError::Publish { .. } => StatusCode::SERVICE_UNAVAILABLE,
                DispatchError::NotRetryable { .. } => StatusCode::CONFLICT,
            },
        }
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::InvalidIdentifier(_) | StorageError::Stream(_) => StatusCode::BAD_REQUEST,
        StorageError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Conflict(_) => StatusCode::CONFLICT,
        StorageError::Config(_) | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. }
        | StoreError::InvalidTransition { .. }
        | StoreError::StillActive { .. }
        | StoreError::Duplicate(_) => StatusCode::CONFLICT,
        e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
            if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                "An internal error occurred".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podcaster_models::{JobId, JobStatus};

    #[test]
    fn test_status_mapping() {
        let id = JobId::parse("j1").unwrap();
        assert_eq!(
            ApiError::from(StorageError::PayloadTooLarge { limit: 10 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(StorageError::from(IdentifierError::Empty)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::NotFound(id.clone())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::StillActive {
                job_id: id.clone(),
                status: JobStatus::Processing,
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(DispatchError::NotRetryable {
                job_id: id,
                status: JobStatus::Completed,
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(JobId::parse("../etc").unwrap_err()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_response_body_has_detail() {
        let response = ApiError::not_found("session s1").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Not found: session s1");
    }
}
