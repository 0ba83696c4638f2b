// src/session/mod.rs

//! Session Store: owns every execution session, serialises registry
//! mutations against lookups, and runs reconnect-tolerant delayed teardown.

pub mod store;

pub use store::{SessionInfo, SessionStore};
