//! Error types shared across the client
//!
//! `ClientError` covers every fallible operation the host can call. Failures that
//! happen *inside* a run (a dropped connection, an `error` event, a cancellation)
//! never surface as `Err`: they are recorded on the run model as a [`FailureKind`]
//! so partial results survive.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure before or while streaming
    #[error("connection failed: {0}")]
    Connection(String),

    /// Non-success HTTP status from the API
    #[error("API returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Run request rejected before any connection was opened
    #[error("invalid request: {0}")]
    Request(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Export could not be produced
    #[error("export failed: {0}")]
    Export(String),

    /// History store failure
    #[error("history store: {0}")]
    History(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ClientError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => ClientError::Connection(err.to_string()),
        }
    }
}

/// Why a run ended in a failed or cancelled phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport failure or abrupt stream end, synthesized by the channel
    Connection,
    /// `error` event sent by the pipeline
    Protocol,
    /// Local user cancellation
    Cancelled,
}

/// Failure recorded on a run model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, ClientError>;
