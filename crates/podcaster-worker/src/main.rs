//! Media job worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use podcaster_media::{CliCollaborator, MediaConfig};
use podcaster_queue::RedisQueue;
use podcaster_storage::{StorageConfig, StorageLayout};
use podcaster_store::RedisJobStore;
use podcaster_worker::{metrics, JobExecutor, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,podcaster_worker=info,podcaster_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

fn exit_with(message: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting podcaster-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = metrics::init_metrics(port) {
            exit_with("Failed to start metrics exporter", e);
        }
        info!("Metrics exporter listening on port {}", port);
    }

    let layout = match StorageLayout::init(&StorageConfig::from_env()).await {
        Ok(layout) => layout,
        Err(e) => exit_with("Storage roots are not usable", e),
    };
    let store = match RedisJobStore::from_env() {
        Ok(store) => store,
        Err(e) => exit_with("Failed to create job store", e),
    };
    let queue = match RedisQueue::from_env() {
        Ok(queue) => queue,
        Err(e) => exit_with("Failed to create job queue", e),
    };
    let collaborator = match CliCollaborator::new(MediaConfig::from_env()) {
        Ok(collaborator) => collaborator,
        Err(e) => exit_with("Media tools unavailable", e),
    };

    let executor = Arc::new(JobExecutor::new(
        config,
        Arc::new(store),
        Arc::new(queue),
        Arc::new(layout),
        Arc::new(collaborator),
    ));
    info!("Consuming as {}", executor.consumer_name());

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        exit_with("Executor error", e);
    }

    info!("Worker shutdown complete");
}
