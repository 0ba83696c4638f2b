// src/relay/mod.rs

//! Streaming Relay: bridges one client connection to one execution session.
//!
//! - [`connection`] holds the per-connection state machine
//!   (`connect` → bound → running → closed) and the close policy.
//! - [`wire`] is the only place events are encoded for the client.
//! - [`stdio`] is a JSON-lines transport over stdin/stdout used by the CLI.
//!
//! Transports only translate bytes into [`ClientMessage`]s and
//! [`OutboundFrame`]s; everything else happens here.

use std::time::Duration;

use serde::Deserialize;

use crate::config::ConfigFile;
use crate::kernel::ExecutionEvent;
use crate::types::{CorrelationId, TeardownPolicy};

pub mod connection;
pub mod stdio;
pub mod wire;

pub use connection::Relay;

/// One code submission from the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub code: String,
    #[serde(default = "unknown_correlation_id", alias = "node_id")]
    pub correlation_id: CorrelationId,
}

fn unknown_correlation_id() -> CorrelationId {
    "unknown".to_string()
}

/// Frames sent back to the client. Serialised by [`wire`].
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// A session event tagged with the submission's correlation id.
    Event {
        correlation_id: CorrelationId,
        event: ExecutionEvent,
    },
    /// Synthetic terminal frame after the idle status of a submission.
    ExecEnd { correlation_id: CorrelationId },
    /// An inbound frame could not be decoded.
    Rejected { message: String },
}

impl OutboundFrame {
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            OutboundFrame::Event { correlation_id, .. }
            | OutboundFrame::ExecEnd { correlation_id } => Some(correlation_id),
            OutboundFrame::Rejected { .. } => None,
        }
    }
}

/// Why the client connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client is about to restart the session; leave it alone.
    Restarting,
    /// The page was closed or navigated away.
    PageLeft,
    /// Any other close code, or the connection dropped without one.
    Other(Option<u16>),
}

impl CloseReason {
    /// Map a WebSocket close code: 1000 is sent by the client before a
    /// restart, 1001 when the page goes away.
    pub fn from_close_code(code: Option<u16>) -> Self {
        match code {
            Some(1000) => CloseReason::Restarting,
            Some(1001) => CloseReason::PageLeft,
            other => CloseReason::Other(other),
        }
    }
}

/// Message delivered by a transport to the relay loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Frame(InboundFrame),
    Close(CloseReason),
}

/// Relay policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub grace_period: Duration,
    pub teardown_on: TeardownPolicy,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            teardown_on: TeardownPolicy::PageLeft,
        }
    }
}

impl RelayOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            grace_period: cfg.grace_period,
            teardown_on: cfg.relay.teardown_on,
        }
    }

    /// Whether a connection closing for `reason` should schedule teardown.
    pub fn tears_down_on(&self, reason: CloseReason) -> bool {
        match (self.teardown_on, reason) {
            (_, CloseReason::Restarting) => false,
            (TeardownPolicy::Never, _) => false,
            (TeardownPolicy::PageLeft, CloseReason::PageLeft) => true,
            (TeardownPolicy::PageLeft, CloseReason::Other(_)) => false,
            (TeardownPolicy::AnyClose, _) => true,
        }
    }
}
