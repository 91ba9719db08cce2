//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Forklift(#[from] forklift_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] forklift_common::telemetry::TelemetryError),

    #[error("invalid request file {path}: {message}")]
    InvalidRequest { path: PathBuf, message: String },

    #[error("{failed} of {total} request files are invalid")]
    InvalidFiles { failed: usize, total: usize },

    #[error("{failed} of {total} workflows did not succeed")]
    WorkflowsFailed { failed: usize, total: usize },
}

impl Error {
    pub fn invalid_request(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            path: path.into(),
            message: message.into(),
        }
    }
}
