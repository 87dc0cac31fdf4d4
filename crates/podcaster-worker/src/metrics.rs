//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "podcaster_worker_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "podcaster_worker_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "podcaster_worker_jobs_failed_total";
    pub const JOBS_SKIPPED_TOTAL: &str = "podcaster_worker_jobs_skipped_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "podcaster_worker_jobs_dead_lettered_total";
    pub const JOB_DURATION_SECONDS: &str = "podcaster_worker_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "podcaster_worker_jobs_in_flight";
    pub const ORPHANS_REPUBLISHED_TOTAL: &str = "podcaster_worker_orphans_republished_total";
}

/// Serve `/metrics` on `0.0.0.0:port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))
}

pub fn record_job_started(kind: &str) {
    counter!(names::JOBS_STARTED_TOTAL, "kind" => kind.to_string()).increment(1);
    gauge!(names::JOBS_IN_FLIGHT).increment(1.0);
}

pub fn record_job_completed(kind: &str, duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL, "kind" => kind.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind.to_string()).record(duration_secs);
}

pub fn record_job_failed(kind: &str, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind.to_string()).record(duration_secs);
}

pub fn record_job_finished() {
    gauge!(names::JOBS_IN_FLIGHT).decrement(1.0);
}

pub fn record_job_skipped() {
    counter!(names::JOBS_SKIPPED_TOTAL).increment(1);
}

pub fn record_dead_lettered() {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(1);
}

pub fn record_orphans_republished(count: usize) {
    counter!(names::ORPHANS_REPUBLISHED_TOTAL).increment(count as u64);
}
