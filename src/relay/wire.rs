// src/relay/wire.rs

//! Client-facing encoding of relay frames.
//!
//! Timestamps leave the process as naive UTC date-times with microsecond
//! precision (`2024-05-01T09:30:00.000123`); this is the only transformation
//! applied to relayed events.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::kernel::EventContent;
use crate::relay::OutboundFrame;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent<'a> {
    correlation_id: &'a str,
    execution_count: u64,
    timestamp: String,
    #[serde(flatten)]
    content: &'a EventContent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireExecEnd<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    correlation_id: &'a str,
}

#[derive(Serialize)]
struct WireRejected<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
}

impl Serialize for OutboundFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OutboundFrame::Event {
                correlation_id,
                event,
            } => WireEvent {
                correlation_id,
                execution_count: event.execution_count,
                timestamp: format_timestamp(&event.timestamp),
                content: &event.content,
            }
            .serialize(serializer),
            OutboundFrame::ExecEnd { correlation_id } => WireExecEnd {
                kind: "exec-end",
                correlation_id,
            }
            .serialize(serializer),
            OutboundFrame::Rejected { message } => WireRejected {
                kind: "rejected",
                message,
            }
            .serialize(serializer),
        }
    }
}

/// Encode one frame as a single JSON text.
pub fn encode(frame: &OutboundFrame) -> serde_json::Result<String> {
    serde_json::to_string(frame)
}
