// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelgateError {
    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("problem '{0}' not found")]
    ProblemNotFound(String),

    #[error("question '{question}' not found in problem '{problem}'")]
    QuestionNotFound { problem: String, question: String },

    #[error("a scoring job is already running for key '{0}'")]
    JobAlreadyRunning(String),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KernelgateError {
    /// Whether the caller can recover from this error locally (unknown ids,
    /// duplicates, malformed input). Everything else is an internal fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KernelgateError::DuplicateSession(_)
                | KernelgateError::SessionNotFound(_)
                | KernelgateError::ProblemNotFound(_)
                | KernelgateError::QuestionNotFound { .. }
                | KernelgateError::JobAlreadyRunning(_)
                | KernelgateError::InvalidSubmission(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, KernelgateError>;
