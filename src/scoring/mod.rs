// src/scoring/mod.rs

//! Scoring Job Engine.
//!
//! - [`literal`] compares answer lists element by element.
//! - [`executable`] runs submitted code plus reference tests as a program.
//! - [`jobs`] is the active-job table (one job per key, RAII slots).
//! - [`engine`] ties them to the catalog and the progress store.

use serde::Serialize;

use crate::types::{JobKey, ProblemId, QuestionId, QuestionStatus, ScoringKind};

pub mod engine;
pub mod executable;
pub mod jobs;
pub mod literal;

pub use engine::ScoringEngine;
pub use executable::{ProgramExit, ProgramOutput, ProgramSpec};
pub use jobs::{JobSlot, JobTable};

pub const CANCELLED_MESSAGE: &str = "Code scoring has been cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// The process was killed; distinct from a failing submission.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRequest {
    pub problem_id: ProblemId,
    pub question_id: QuestionId,
    pub kind: ScoringKind,
    pub submitted_answers: Vec<String>,
    pub job_key: JobKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    pub verdict: Verdict,
    /// Per-answer results for literal scoring; empty for executable scoring.
    pub results: Vec<bool>,
    /// Human-readable summary shown to the learner.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub problem_status: QuestionStatus,
}
