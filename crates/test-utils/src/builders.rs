#![allow(dead_code)]

use std::path::PathBuf;

use kernelgate::catalog::{Catalog, ProblemSpec, QuestionSpec};
use kernelgate::config::{ConfigFile, RawConfigFile};
use kernelgate::types::{KernelDialect, TeardownPolicy};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the built-in defaults with a `sh` kernel and `sh` as the
/// scoring interpreter, so tests never need Python.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.kernel.dialect = KernelDialect::Shell;
        config.kernel.program = Some("sh".to_string());
        config.scoring.program = "sh".to_string();
        config.scoring.search_path_var = String::new();
        config.scoring.file_suffix = ".sh".to_string();
        config.storage.progress_db = ":memory:".to_string();
        Self { config }
    }

    pub fn kernel_program(mut self, program: &str) -> Self {
        self.config.kernel.program = Some(program.to_string());
        self
    }

    pub fn interrupt_signal(mut self, signal: &str) -> Self {
        self.config.kernel.interrupt_signal = signal.to_string();
        self
    }

    pub fn grace_period(mut self, grace: &str) -> Self {
        self.config.relay.grace_period = grace.to_string();
        self
    }

    pub fn teardown_on(mut self, policy: TeardownPolicy) -> Self {
        self.config.relay.teardown_on = policy;
        self
    }

    pub fn scoring_program(mut self, program: &str) -> Self {
        self.config.scoring.program = program.to_string();
        self
    }

    pub fn search_path(mut self, var: &str, path: impl Into<PathBuf>) -> Self {
        self.config.scoring.search_path_var = var.to_string();
        self.config.scoring.search_paths = vec![path.into()];
        self
    }

    pub fn progress_db(mut self, path: &str) -> Self {
        self.config.storage.progress_db = path.to_string();
        self
    }

    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage.catalog = path.into();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a problem catalog.
#[derive(Default)]
pub struct CatalogBuilder {
    catalog: Catalog,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a question; the problem is created on first use.
    pub fn question(mut self, problem: &str, question: &str, answers: &[&str]) -> Self {
        self.entry(problem).question.insert(
            question.to_string(),
            QuestionSpec {
                answers: answers.iter().map(|s| s.to_string()).collect(),
                explanation: None,
            },
        );
        self
    }

    pub fn explained_question(
        mut self,
        problem: &str,
        question: &str,
        answers: &[&str],
        explanation: &str,
    ) -> Self {
        self.entry(problem).question.insert(
            question.to_string(),
            QuestionSpec {
                answers: answers.iter().map(|s| s.to_string()).collect(),
                explanation: Some(explanation.to_string()),
            },
        );
        self
    }

    fn entry(&mut self, problem: &str) -> &mut ProblemSpec {
        self.catalog.problem.entry(problem.to_string()).or_default()
    }

    pub fn build(self) -> Catalog {
        self.catalog
            .validate()
            .expect("Failed to build valid catalog from builder");
        self.catalog
    }
}
