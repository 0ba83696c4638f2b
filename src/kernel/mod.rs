// src/kernel/mod.rs

//! Execution sessions: persistent interpreter processes driven one
//! submission at a time.
//!
//! - [`session`] owns the process, its stdin and its merged output lines.
//! - [`dialect`] frames code for a given kernel flavour and parses what comes
//!   back, including the per-submission completion marker.
//! - [`event`] defines the typed events a submission produces.

pub mod dialect;
pub mod event;
pub mod session;

pub use dialect::KernelLine;
pub use event::{EventContent, ExecutionEvent, ExecutionState, StreamName};
pub use session::{EventStream, ExecutionSession, KernelSpec};
