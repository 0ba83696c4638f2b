// src/session/store.rs

//! In-memory registry of execution sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{KernelgateError, Result};
use crate::kernel::{ExecutionSession, KernelSpec};
use crate::types::SessionId;

/// Snapshot of one registered session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub is_alive: bool,
    pub is_busy: bool,
    pub created_at: DateTime<Utc>,
}

/// A scheduled teardown. `generation` tells a finished timer whether the
/// entry under its id is still its own.
struct PendingTeardown {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry of live sessions keyed by id.
///
/// The `RwLock` is the readiness gate: `start`, `stop`, `restart` and
/// `stop_all` hold the write half for their whole duration (including process
/// spawn and teardown), so a lookup never observes a half-created or
/// half-destroyed session. Lookups share the read half and run concurrently.
pub struct SessionStore {
    spec: KernelSpec,
    sessions: RwLock<HashMap<SessionId, Arc<ExecutionSession>>>,
    teardowns: Mutex<HashMap<SessionId, PendingTeardown>>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(spec: KernelSpec) -> Self {
        Self {
            spec,
            sessions: RwLock::new(HashMap::new()),
            teardowns: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Start a kernel under `id`, or under a fresh UUID when `id` is `None`.
    ///
    /// Fails with `DuplicateSession` while a live kernel holds the id. A
    /// registered kernel that has already exited is reaped and replaced.
    pub async fn start(&self, id: Option<SessionId>) -> Result<SessionId> {
        let mut sessions = self.sessions.write().await;
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if let Some(existing) = sessions.get(&id) {
            if existing.is_alive().await {
                return Err(KernelgateError::DuplicateSession(id));
            }
            debug!(session = %id, "replacing exited kernel");
            sessions.remove(&id);
        }
        self.cancel_teardown(&id);

        let session = ExecutionSession::spawn(id.clone(), &self.spec).await?;
        sessions.insert(id.clone(), Arc::new(session));
        info!(session = %id, live = sessions.len(), "session started");
        Ok(id)
    }

    /// Stop and unregister one session.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .remove(id)
            .ok_or_else(|| KernelgateError::SessionNotFound(id.to_string()))?;
        self.cancel_teardown(id);
        session.shutdown().await;
        info!(session = %id, live = sessions.len(), "session stopped");
        Ok(())
    }

    /// Stop every session (server shutdown, `DELETE /sessions`).
    pub async fn stop_all(&self) {
        let mut sessions = self.sessions.write().await;
        {
            let mut teardowns = self.lock_teardowns();
            for (_, pending) in teardowns.drain() {
                pending.handle.abort();
            }
        }
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.shutdown().await;
        }
        info!(stopped = count, "all sessions stopped");
    }

    /// Replace the kernel behind `id` with a fresh one under the same id.
    pub async fn restart(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let old = sessions
            .remove(id)
            .ok_or_else(|| KernelgateError::SessionNotFound(id.to_string()))?;
        self.cancel_teardown(id);
        old.shutdown().await;

        let session = ExecutionSession::spawn(id.to_string(), &self.spec).await?;
        sessions.insert(id.to_string(), Arc::new(session));
        info!(session = %id, "session restarted");
        Ok(())
    }

    /// Signal the running code without destroying the session.
    pub async fn interrupt(&self, id: &str) -> Result<()> {
        self.get(id).await?.interrupt()
    }

    /// Whether `id` names a running kernel. Unknown ids are simply `false`.
    pub async fn is_alive(&self, id: &str) -> bool {
        let session = self.sessions.read().await.get(id).cloned();
        match session {
            Some(session) => session.is_alive().await,
            None => false,
        }
    }

    /// Borrow a session. Waits while a start/stop/restart is in flight.
    pub async fn get(&self, id: &str) -> Result<Arc<ExecutionSession>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| KernelgateError::SessionNotFound(id.to_string()))
    }

    pub async fn info(&self, id: &str) -> Result<SessionInfo> {
        let session = self.get(id).await?;
        Ok(SessionInfo {
            session_id: id.to_string(),
            is_alive: session.is_alive().await,
            is_busy: session.is_busy(),
            created_at: session.created_at(),
        })
    }

    /// Ids of all registered sessions, sorted.
    pub async fn list(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop `id` after `grace` unless [`cancel_teardown`](Self::cancel_teardown)
    /// runs first. A second schedule for the same id replaces the first.
    pub fn schedule_teardown(self: &Arc<Self>, id: &str, grace: Duration) {
        let store = Arc::clone(self);
        let session_id = id.to_string();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // Hold the map while spawning so the task cannot claim its entry
        // before it has been inserted.
        let mut teardowns = self.lock_teardowns();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // Once claimed, a reconnect can no longer cancel this teardown.
            // A cancelled or replaced entry is left alone.
            {
                let mut teardowns = store.lock_teardowns();
                match teardowns.get(&session_id) {
                    Some(pending) if pending.generation == generation => {
                        teardowns.remove(&session_id);
                    }
                    _ => {
                        debug!(session = %session_id, "teardown superseded");
                        return;
                    }
                }
            }
            match store.stop(&session_id).await {
                Ok(()) => info!(session = %session_id, "idle session torn down after grace period"),
                Err(KernelgateError::SessionNotFound(_)) => {
                    debug!(session = %session_id, "session already gone at teardown")
                }
                Err(e) => warn!(session = %session_id, error = %e, "delayed teardown failed"),
            }
        });

        if let Some(previous) =
            teardowns.insert(id.to_string(), PendingTeardown { generation, handle })
        {
            previous.handle.abort();
        }
        drop(teardowns);
        debug!(session = %id, grace_ms = grace.as_millis() as u64, "teardown scheduled");
    }

    /// Cancel a pending delayed teardown. Returns whether one was pending.
    pub fn cancel_teardown(&self, id: &str) -> bool {
        match self.lock_teardowns().remove(id) {
            Some(pending) => {
                pending.handle.abort();
                debug!(session = %id, "pending teardown cancelled");
                true
            }
            None => false,
        }
    }

    pub fn has_pending_teardown(&self, id: &str) -> bool {
        self.lock_teardowns().contains_key(id)
    }

    fn lock_teardowns(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, PendingTeardown>> {
        // The map holds only join handles; a poisoned guard is still usable.
        self.teardowns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
