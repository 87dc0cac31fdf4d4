//! Podcaster HTTP API.
//!
//! Thin axum boundary over the storage layout, the job store and the
//! dispatcher. Media work happens in `podcaster-worker`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
