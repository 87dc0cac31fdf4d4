//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running external tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found")]
    ToolNotFound(String),

    #[error("{message}")]
    ToolFailed {
        tool: String,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("Input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("Tool reported success but produced no output at {0}")]
    NoOutput(PathBuf),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(
        tool: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Human-readable summary including the last stderr lines, if any.
    pub fn diagnostic(&self) -> String {
        match self {
            MediaError::ToolFailed {
                message,
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => {
                let tail: Vec<&str> = stderr
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                let start = tail.len().saturating_sub(3);
                format!("{message}: {}", tail[start..].join(" | "))
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_uses_stderr_tail() {
        let err = MediaError::tool_failed(
            "ffmpeg",
            "ffmpeg exited with status 1",
            Some("line1\n\nline2\nline3\nInvalid data found when processing input\n".into()),
            Some(1),
        );
        assert_eq!(
            err.diagnostic(),
            "ffmpeg exited with status 1: line2 | line3 | Invalid data found when processing input"
        );
    }

    #[test]
    fn test_diagnostic_without_stderr() {
        let err = MediaError::Timeout {
            tool: "whisper".into(),
            secs: 10,
        };
        assert_eq!(err.diagnostic(), "whisper timed out after 10 seconds");
    }
}
