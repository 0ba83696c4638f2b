// src/scoring/jobs.rs

//! Active-job table: at most one running scoring process per job key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, oneshot};
use tracing::{debug, info};

use crate::errors::{KernelgateError, Result};
use crate::types::JobKey;

/// Internal handle for a running job.
///
/// `run_id` distinguishes successive jobs under the same key, so a finished
/// run never evicts the entry of a newer one.
struct ActiveJob {
    run_id: u64,
    cancel: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct Shared {
    active: Mutex<HashMap<JobKey, ActiveJob>>,
    next_run_id: AtomicU64,
    drained: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, ActiveJob>> {
        // The map holds plain handles; a poisoned guard is still consistent.
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared table of running scoring jobs. Cloning shares the table.
#[derive(Clone, Default)]
pub struct JobTable {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for JobTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTable")
            .field("active", &self.len())
            .finish()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. The check and the insert happen under one lock, so two
    /// racing callers can never both get a slot.
    pub fn try_register(&self, key: &str) -> Result<JobSlot> {
        let mut active = self.shared.lock();
        if active.contains_key(key) {
            return Err(KernelgateError::JobAlreadyRunning(key.to_string()));
        }

        let run_id = self.shared.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        active.insert(
            key.to_string(),
            ActiveJob {
                run_id,
                cancel: Some(cancel_tx),
            },
        );
        debug!(job_key = %key, run_id, "job slot claimed");

        Ok(JobSlot {
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
            run_id,
            cancel_rx,
        })
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.shared.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask the job under `key` to stop. Absent keys are a no-op.
    ///
    /// Returns whether a running job was signalled. The entry itself is
    /// released by the job's [`JobSlot`] once its process is gone.
    pub fn cancel(&self, key: &str) -> bool {
        let mut active = self.shared.lock();
        let Some(job) = active.get_mut(key) else {
            debug!(job_key = %key, "cancel for idle job key; nothing to do");
            return false;
        };

        match job.cancel.take() {
            Some(cancel) => {
                info!(job_key = %key, run_id = job.run_id, "cancelling scoring job");
                cancel.send(()).is_ok()
            }
            None => {
                debug!(job_key = %key, run_id = job.run_id, "job already cancelled");
                false
            }
        }
    }

    /// Signal every running job. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut active = self.shared.lock();
        let mut signalled = 0;
        for job in active.values_mut() {
            if let Some(cancel) = job.cancel.take() {
                if cancel.send(()).is_ok() {
                    signalled += 1;
                }
            }
        }
        signalled
    }

    /// Resolve once no job holds a slot.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.shared.drained.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Ownership of one job key for the lifetime of a scoring run.
///
/// Dropping the slot releases the key, on every exit path.
pub struct JobSlot {
    shared: Arc<Shared>,
    key: JobKey,
    run_id: u64,
    cancel_rx: oneshot::Receiver<()>,
}

impl JobSlot {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolves with `Ok(())` once [`JobTable::cancel`] targets this run.
    pub fn cancel_signal(&mut self) -> &mut oneshot::Receiver<()> {
        &mut self.cancel_rx
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        let mut active = self.shared.lock();
        if active.get(&self.key).is_some_and(|job| job.run_id == self.run_id) {
            active.remove(&self.key);
            debug!(job_key = %self.key, run_id = self.run_id, "job slot released");
        }
        let empty = active.is_empty();
        drop(active);
        if empty {
            self.shared.drained.notify_waiters();
        }
    }
}
