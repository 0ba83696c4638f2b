// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a live execution session.
pub type SessionId = String;

/// Caller-chosen key guarding at most one concurrent scoring job.
///
/// Interactive callers pass their session id here, so the key space is shared
/// with [`SessionId`].
pub type JobKey = String;

/// Per-message id supplied by the client and echoed on every relayed event.
pub type CorrelationId = String;

pub type ProblemId = String;
pub type QuestionId = String;

/// Grading state of a single question (and, derived, of a whole problem).
///
/// Persisted as an integer: untried 0, tried 1, complete 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    #[default]
    Untried,
    Tried,
    Complete,
}

impl QuestionStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            QuestionStatus::Untried => 0,
            QuestionStatus::Tried => 1,
            QuestionStatus::Complete => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(QuestionStatus::Untried),
            1 => Some(QuestionStatus::Tried),
            2 => Some(QuestionStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionStatus::Untried => "untried",
            QuestionStatus::Tried => "tried",
            QuestionStatus::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// How a submitted answer is graded.
///
/// - `Literal`: element-wise string equality against the reference list.
/// - `Executable`: submitted code + reference test code run as one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringKind {
    #[serde(alias = "word")]
    Literal,
    #[serde(alias = "code")]
    Executable,
}

impl FromStr for ScoringKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "literal" | "word" | "0" => Ok(ScoringKind::Literal),
            "executable" | "code" | "1" => Ok(ScoringKind::Executable),
            other => Err(format!(
                "invalid scoring kind: {other} (expected \"literal\" or \"code\")"
            )),
        }
    }
}

impl fmt::Display for ScoringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringKind::Literal => f.write_str("literal"),
            ScoringKind::Executable => f.write_str("code"),
        }
    }
}

/// Which relay disconnects schedule a delayed session teardown.
///
/// - `PageLeft` (default): only a "page left" close tears down; a
///   "restarting" close leaves the session alone.
/// - `AnyClose`: every close other than "restarting" tears down, including
///   abnormal drops without a close reason.
/// - `Never`: sessions are only stopped explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownPolicy {
    #[default]
    PageLeft,
    AnyClose,
    Never,
}

impl FromStr for TeardownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "page-left" => Ok(TeardownPolicy::PageLeft),
            "any-close" => Ok(TeardownPolicy::AnyClose),
            "never" => Ok(TeardownPolicy::Never),
            other => Err(format!(
                "invalid teardown_on: {other} (expected \"page-left\", \"any-close\" or \"never\")"
            )),
        }
    }
}

/// Wire protocol spoken by the resident kernel process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KernelDialect {
    /// Persistent POSIX shell fed through `command eval`.
    ///
    /// The shell traps SIGINT to survive interrupts, so an interrupt only
    /// stops external commands. A loop made only of built-ins (for example
    /// `while :; do :; done`) keeps running; restart the session to stop it.
    #[default]
    Shell,
    /// Resident Python driver speaking JSON lines.
    Python,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_integer_mapping_round_trips_known_values() {
        for status in [
            QuestionStatus::Untried,
            QuestionStatus::Tried,
            QuestionStatus::Complete,
        ] {
            assert_eq!(QuestionStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(QuestionStatus::from_i64(7), None);
    }

    #[test]
    fn scoring_kind_accepts_legacy_names() {
        assert_eq!("word".parse::<ScoringKind>(), Ok(ScoringKind::Literal));
        assert_eq!(" Code ".parse::<ScoringKind>(), Ok(ScoringKind::Executable));
        assert!("essay".parse::<ScoringKind>().is_err());
    }
}
