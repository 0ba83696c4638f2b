// src/kernel/event.rs

//! Typed execution events emitted by a session for one submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Busy,
    Idle,
}

/// Payload of an [`ExecutionEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventContent {
    /// A chunk of text written by the submitted code.
    Stream { name: StreamName, text: String },
    /// Rich output keyed by MIME type (e.g. `text/plain`).
    DisplayData { data: Map<String, Value> },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    Status { execution_state: ExecutionState },
}

/// One event in the stream produced by `ExecutionSession::submit`.
///
/// A stream always ends with exactly one `Status { Idle }` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEvent {
    /// 1-based submission counter within the session.
    pub execution_count: u64,
    pub timestamp: DateTime<Utc>,
    pub content: EventContent,
}

impl ExecutionEvent {
    pub fn new(execution_count: u64, content: EventContent) -> Self {
        Self {
            execution_count,
            timestamp: Utc::now(),
            content,
        }
    }

    /// The end-of-stream signal: the kernel reported it is idle again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.content,
            EventContent::Status {
                execution_state: ExecutionState::Idle
            }
        )
    }
}
