//! Wire events pushed by the workflow stream

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::StepId;

/// One server-pushed event, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start,
    Progress {
        step: StepId,
        #[serde(default)]
        message: String,
    },
    StepComplete {
        step: StepId,
        #[serde(default)]
        data: Value,
    },
    Complete,
    Error {
        #[serde(default)]
        message: String,
        /// Set when the channel synthesized this event for a transport failure
        #[serde(skip)]
        transport: bool,
    },
    CacheHit {
        #[serde(default)]
        data: Value,
    },
}

/// Message of the synthetic error emitted for connection failures
pub const CONNECTION_FAILED_MESSAGE: &str = "Stream connection failed. Please try again.";

const KNOWN_TYPES: [&str; 6] = [
    "start",
    "progress",
    "step_complete",
    "complete",
    "error",
    "cache_hit",
];

impl StreamEvent {
    /// Error event reported by the pipeline itself
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            transport: false,
        }
    }

    /// Synthetic error for a dropped or failed connection
    pub fn connection_failed() -> Self {
        Self::Error {
            message: CONNECTION_FAILED_MESSAGE.to_string(),
            transport: true,
        }
    }

    /// Events after which the stream delivers nothing more
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Error { .. } | Self::CacheHit { .. }
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Progress { .. } => "progress",
            Self::StepComplete { .. } => "step_complete",
            Self::Complete => "complete",
            Self::Error { .. } => "error",
            Self::CacheHit { .. } => "cache_hit",
        }
    }
}

/// Why a payload line could not become an event
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Event(StreamEvent),
    /// Well-formed JSON with a `type` this client does not handle
    Unsupported(String),
    /// Not JSON, no `type`, or fields of the wrong shape
    Malformed(String),
}

/// Decode one payload line (already stripped of SSE framing)
pub fn parse_event(payload: &str) -> ParseOutcome {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => return ParseOutcome::Malformed(format!("invalid JSON: {}", e)),
    };

    let event_type = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => return ParseOutcome::Malformed("missing \"type\" field".to_string()),
    };

    if !KNOWN_TYPES.contains(&event_type.as_str()) {
        return ParseOutcome::Unsupported(event_type);
    }

    match serde_json::from_value::<StreamEvent>(value) {
        Ok(event) => ParseOutcome::Event(event),
        Err(e) => ParseOutcome::Malformed(format!("bad \"{}\" event: {}", event_type, e)),
    }
}
