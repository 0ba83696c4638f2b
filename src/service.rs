// src/service.rs

//! Process-wide services, built once and shared by every transport.

use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::config::ConfigFile;
use crate::errors::Result;
use crate::kernel::KernelSpec;
use crate::progress::{ProgressStore, SqliteProgressStore};
use crate::relay::{Relay, RelayOptions};
use crate::scoring::{ProgramSpec, ScoringEngine};
use crate::session::SessionStore;

/// Owns the session store, the scoring engine and the progress store.
#[derive(Debug, Clone)]
pub struct Backend {
    pub sessions: Arc<SessionStore>,
    pub scoring: ScoringEngine,
    pub relay_options: RelayOptions,
}

impl Backend {
    pub fn new(
        kernel: KernelSpec,
        catalog: Catalog,
        progress: Arc<dyn ProgressStore>,
        program: ProgramSpec,
        relay_options: RelayOptions,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(kernel)),
            scoring: ScoringEngine::new(Arc::new(catalog), progress, program),
            relay_options,
        }
    }

    /// Load the catalog and open the progress database named by `cfg`.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let catalog = Catalog::load_or_empty(&cfg.storage.catalog)?;
        let progress = SqliteProgressStore::open(&cfg.storage.progress_db)?;
        info!(
            problems = catalog.problem.len(),
            progress_db = %cfg.storage.progress_db,
            "backend ready"
        );

        Ok(Self::new(
            KernelSpec::from_config(cfg),
            catalog,
            Arc::new(progress),
            ProgramSpec::from_config(cfg),
            RelayOptions::from_config(cfg),
        ))
    }

    pub fn progress(&self) -> &Arc<dyn ProgressStore> {
        self.scoring.progress()
    }

    pub fn catalog(&self) -> &Catalog {
        self.scoring.catalog()
    }

    /// Bind a new relay connection to `session_id`.
    pub async fn connect(&self, session_id: &str) -> Result<Relay> {
        Relay::connect(Arc::clone(&self.sessions), session_id, self.relay_options).await
    }

    /// Kill running scoring jobs, then stop every session.
    pub async fn shutdown(&self) {
        info!("shutting down backend");
        self.scoring.shutdown().await;
        self.sessions.stop_all().await;
    }
}
