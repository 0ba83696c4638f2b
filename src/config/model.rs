// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::Deserialize;

use crate::types::{KernelDialect, TeardownPolicy};

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [kernel]
/// dialect = "shell"
///
/// [relay]
/// grace_period = "5s"
/// teardown_on = "page-left"
///
/// [scoring]
/// program = "python3"
/// search_path_var = "PYTHONPATH"
///
/// [storage]
/// progress_db = "kernelgate-progress.db"
/// catalog = "problems.toml"
/// ```
///
/// All sections are optional and have reasonable defaults. Turn it into a
/// [`ConfigFile`] with `ConfigFile::try_from(raw)`, which validates it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub kernel: KernelSection,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default)]
    pub scoring: ScoringSection,

    #[serde(default)]
    pub storage: StorageSection,
}

/// `[kernel]` section: how interactive execution sessions are spawned.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelSection {
    #[serde(default)]
    pub dialect: KernelDialect,

    /// Interpreter binary. If `None`, depends on the dialect (`sh` or
    /// `python3`).
    #[serde(default)]
    pub program: Option<String>,

    /// Extra arguments passed before any dialect-specific arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Signal delivered to the kernel's process group on interrupt.
    #[serde(default = "default_interrupt_signal")]
    pub interrupt_signal: String,
}

fn default_interrupt_signal() -> String {
    "SIGINT".to_string()
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            dialect: KernelDialect::default(),
            program: None,
            args: Vec::new(),
            interrupt_signal: default_interrupt_signal(),
        }
    }
}

impl KernelSection {
    pub fn effective_program(&self) -> String {
        match (&self.program, self.dialect) {
            (Some(p), _) => p.clone(),
            (None, KernelDialect::Shell) => "sh".to_string(),
            (None, KernelDialect::Python) => "python3".to_string(),
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// How long a disconnected session survives before teardown, e.g. `"5s"`.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    #[serde(default)]
    pub teardown_on: TeardownPolicy,
}

fn default_grace_period() -> String {
    "5s".to_string()
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            teardown_on: TeardownPolicy::default(),
        }
    }
}

/// `[scoring]` section: how executable answers are run.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSection {
    #[serde(default = "default_scoring_program")]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variable extended with `search_paths` (e.g. `PYTHONPATH`).
    /// Empty disables the extension.
    #[serde(default = "default_search_path_var")]
    pub search_path_var: String,

    /// Directories prepended to `search_path_var`. Relative entries are
    /// resolved against the working directory at startup.
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,

    /// Where the combined program is written. Unset or empty uses the OS
    /// temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
}

fn default_scoring_program() -> String {
    "python3".to_string()
}

fn default_search_path_var() -> String {
    "PYTHONPATH".to_string()
}

fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_file_suffix() -> String {
    ".py".to_string()
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            program: default_scoring_program(),
            args: Vec::new(),
            search_path_var: default_search_path_var(),
            search_paths: default_search_paths(),
            temp_dir: None,
            file_suffix: default_file_suffix(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// SQLite file holding progress; `":memory:"` keeps it in memory.
    #[serde(default = "default_progress_db")]
    pub progress_db: String,

    /// Problem catalog (TOML) with reference answers.
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
}

fn default_progress_db() -> String {
    "kernelgate-progress.db".to_string()
}

fn default_catalog() -> PathBuf {
    PathBuf::from("problems.toml")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            progress_db: default_progress_db(),
            catalog: default_catalog(),
        }
    }
}

/// Validated configuration.
///
/// Holds the raw sections plus the values that were parsed out of strings
/// during validation, so consumers never re-parse.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub kernel: KernelSection,
    pub relay: RelaySection,
    pub scoring: ScoringSection,
    pub storage: StorageSection,
    pub grace_period: Duration,
    pub interrupt_signal: Signal,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        grace_period: Duration,
        interrupt_signal: Signal,
    ) -> Self {
        Self {
            kernel: raw.kernel,
            relay: raw.relay,
            scoring: raw.scoring,
            storage: raw.storage,
            grace_period,
            interrupt_signal,
        }
    }
}
