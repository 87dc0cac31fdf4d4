//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    add_to_session, create_session, delete_job, delete_output, delete_processed, delete_session,
    delete_session_file, download_output, download_processed, download_session_file, fail_job,
    get_job, get_job_status, get_session, health, list_jobs, list_outputs, list_processed,
    list_uploads, metrics, ready, retry_job, submit_job,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/uploads", post(create_session).get(list_uploads))
        .route(
            "/uploads/:session_id",
            post(add_to_session).get(get_session).delete(delete_session),
        )
        .route(
            "/uploads/:session_id/:role",
            get(download_session_file).delete(delete_session_file),
        )
        // the ingestor enforces the upload ceiling while streaming
        .layer(DefaultBodyLimit::disable());

    let job_routes = Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job).delete(delete_job))
        .route("/jobs/:job_id/status", get(get_job_status))
        .route("/jobs/:job_id/retry", post(retry_job))
        // Operator compensation for stuck jobs
        .route("/jobs/:job_id/fail", post(fail_job))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size));

    let artifact_routes = Router::new()
        .route("/processed", get(list_processed))
        .route(
            "/processed/:job_id",
            get(download_processed).delete(delete_processed),
        )
        .route("/outputs", get(list_outputs))
        .route("/outputs/:name", get(download_output).delete(delete_output));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(job_routes)
        .merge(artifact_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id))
                .layer(middleware::from_fn(request_logging))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
