//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) | QueueError::PublishFailed(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error() || e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped()
            }
            QueueError::DeliveryNotFound(_) | QueueError::Json(_) => false,
        }
    }
}
