//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use podcaster_models::Category;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub job_store: CheckStatus,
    pub queue: CheckStatus,
    pub storage: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>, start: Instant) -> Self {
        match result {
            Ok(()) => Self {
                status: "ok".to_string(),
                error: None,
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(e) => Self {
                status: "error".to_string(),
                error: Some(e.to_string()),
                latency_ms: None,
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the job store, the queue and the storage roots.
pub async fn ready(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let job_store = CheckStatus::from_result(state.store.ping().await, start);

    let start = Instant::now();
    let queue = CheckStatus::from_result(state.queue.len().await.map(|_| ()), start);

    let start = Instant::now();
    let mut storage_result = Ok(());
    for category in [Category::Uploads, Category::Processed, Category::Outputs] {
        let root = state.layout.root(category);
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => storage_result = Err(format!("{} is not a directory", root.display())),
            Err(e) => storage_result = Err(format!("{}: {e}", root.display())),
        }
    }
    let storage = CheckStatus::from_result(storage_result, start);

    let all_ok = job_store.is_ok() && queue.is_ok() && storage.is_ok();
    let body = ReadinessResponse {
        status: if all_ok { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            job_store,
            queue,
            storage,
        },
    };
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
