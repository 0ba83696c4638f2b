// src/progress/mod.rs

//! Progress Aggregation: per-problem grading state for one learner.
//!
//! The merge and derivation rules live on [`ProgressRecord`] and are pure.
//! Stores only persist records and make read-merge-write atomic.
//!
//! - [`memory`] keeps records in a map (tests, `:memory:` setups).
//! - [`sqlite`] persists them with `rusqlite`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::errors::Result;
use crate::types::{ProblemId, QuestionId, QuestionStatus, ScoringKind};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryProgressStore;
pub use sqlite::SqliteProgressStore;

/// Durable grading state of one problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub problem_id: ProblemId,
    pub question_status: BTreeMap<QuestionId, QuestionStatus>,
    pub question_content: BTreeMap<QuestionId, Value>,
    pub problem_status: QuestionStatus,
}

impl ProgressRecord {
    pub fn new(problem_id: impl Into<ProblemId>) -> Self {
        Self {
            problem_id: problem_id.into(),
            question_status: BTreeMap::new(),
            question_content: BTreeMap::new(),
            problem_status: QuestionStatus::Untried,
        }
    }

    /// Merge one graded question and recompute the problem status against
    /// `defined`, the question ids the problem defines right now.
    ///
    /// Entries for other questions are left untouched.
    pub fn merge(
        &mut self,
        question_id: &str,
        status: QuestionStatus,
        content: Value,
        defined: &[QuestionId],
    ) {
        self.question_status.insert(question_id.to_string(), status);
        self.question_content.insert(question_id.to_string(), content);
        self.problem_status = derive_problem_status(&self.question_status, defined);
    }

    /// Replace the saved content of every question without grading.
    pub fn apply_draft(&mut self, contents: BTreeMap<QuestionId, Value>) {
        self.question_content = contents;
        if self.problem_status == QuestionStatus::Untried {
            self.problem_status = QuestionStatus::Tried;
        }
    }
}

/// Complete iff every defined question is present and complete; otherwise
/// tried if anything was recorded at all; otherwise untried.
///
/// Keys in `statuses` that the problem no longer defines are ignored for
/// completion but still count as "tried".
pub fn derive_problem_status(
    statuses: &BTreeMap<QuestionId, QuestionStatus>,
    defined: &[QuestionId],
) -> QuestionStatus {
    let all_complete = !defined.is_empty()
        && defined
            .iter()
            .all(|q| statuses.get(q) == Some(&QuestionStatus::Complete));

    if all_complete {
        QuestionStatus::Complete
    } else if !statuses.is_empty() {
        QuestionStatus::Tried
    } else {
        QuestionStatus::Untried
    }
}

/// One row of the attempt log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub problem_id: ProblemId,
    pub question_id: QuestionId,
    pub kind: ScoringKind,
    /// Submitted answers as JSON text.
    pub content: String,
    pub status: QuestionStatus,
    pub answered_at: DateTime<Utc>,
}

/// Persistence for progress records and the attempt log.
///
/// `commit` and `save_draft` are read-merge-write operations; implementations
/// must make each one atomic.
pub trait ProgressStore: Send + Sync + std::fmt::Debug {
    fn get(&self, problem_id: &str) -> Result<Option<ProgressRecord>>;

    /// Upsert one graded question and return the merged record.
    fn commit(
        &self,
        problem_id: &str,
        question_id: &str,
        status: QuestionStatus,
        content: Value,
        defined: &[QuestionId],
    ) -> Result<ProgressRecord>;

    /// Store draft content for the whole problem and return the record.
    fn save_draft(
        &self,
        problem_id: &str,
        contents: BTreeMap<QuestionId, Value>,
    ) -> Result<ProgressRecord>;

    fn record_attempt(&self, attempt: &AttemptRecord) -> Result<()>;

    /// Attempts for `problem_id`, oldest first.
    fn attempts(&self, problem_id: &str) -> Result<Vec<AttemptRecord>>;
}
