//! Media job worker.
//!
//! This crate provides:
//! - Job executor consuming the work queue with bounded concurrency
//! - Per-job processing: claim, resolve inputs, run the collaborator, commit
//! - Crash recovery of stale deliveries and orphaned `PENDING` jobs
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{JobProcessor, ProcessOutcome};
