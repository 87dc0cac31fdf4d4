//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
/// Returns a handle that renders the `/metrics` payload.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "podcaster_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "podcaster_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "podcaster_http_requests_in_flight";

    // Pipeline metrics
    pub const UPLOAD_BYTES_TOTAL: &str = "podcaster_upload_bytes_total";
    pub const UPLOADS_REJECTED_TOTAL: &str = "podcaster_uploads_rejected_total";
    pub const JOBS_SUBMITTED_TOTAL: &str = "podcaster_jobs_submitted_total";
    pub const JOBS_UNQUEUED_TOTAL: &str = "podcaster_jobs_unqueued_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", route.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_upload(role: &str, bytes: u64) {
    counter!(names::UPLOAD_BYTES_TOTAL, "role" => role.to_string()).increment(bytes);
}

pub fn record_upload_rejected(reason: &'static str) {
    counter!(names::UPLOADS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_job_submitted(kind: &str) {
    counter!(names::JOBS_SUBMITTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// A job row was created but its queue message was not published.
pub fn record_job_unqueued(kind: &str) {
    counter!(names::JOBS_UNQUEUED_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Label for a request path. Uses the matched route template so ids do
/// not explode label cardinality.
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let route = route_label(&request);
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &route, status, start.elapsed().as_secs_f64());

    response
}
