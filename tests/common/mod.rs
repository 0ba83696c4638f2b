#![allow(dead_code)]

use std::error::Error;
use std::time::Duration;

use kernelgate::kernel::{EventContent, ExecutionEvent, StreamName};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Concatenated stdout text of a run.
pub fn stdout_text(events: &[ExecutionEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match &e.content {
            EventContent::Stream {
                name: StreamName::Stdout,
                text,
            } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Names of the error events of a run, in order.
pub fn error_names(events: &[ExecutionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.content {
            EventContent::Error { ename, .. } => Some(ename.clone()),
            _ => None,
        })
        .collect()
}

/// Poll `check` every 20ms until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
