// src/progress/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::{AttemptRecord, ProgressRecord, ProgressStore};
use crate::errors::{KernelgateError, Result};
use crate::types::{ProblemId, QuestionId, QuestionStatus};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<ProblemId, ProgressRecord>,
    attempts: Vec<AttemptRecord>,
}

/// Progress kept in process memory. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| KernelgateError::Other(anyhow::anyhow!("progress store lock poisoned")))
    }
}

impl ProgressStore for MemoryProgressStore {
    fn get(&self, problem_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.lock()?.records.get(problem_id).cloned())
    }

    fn commit(
        &self,
        problem_id: &str,
        question_id: &str,
        status: QuestionStatus,
        content: Value,
        defined: &[QuestionId],
    ) -> Result<ProgressRecord> {
        let mut inner = self.lock()?;
        let record = inner
            .records
            .entry(problem_id.to_string())
            .or_insert_with(|| ProgressRecord::new(problem_id));
        record.merge(question_id, status, content, defined);
        Ok(record.clone())
    }

    fn save_draft(
        &self,
        problem_id: &str,
        contents: BTreeMap<QuestionId, Value>,
    ) -> Result<ProgressRecord> {
        let mut inner = self.lock()?;
        let record = inner
            .records
            .entry(problem_id.to_string())
            .or_insert_with(|| ProgressRecord::new(problem_id));
        record.apply_draft(contents);
        Ok(record.clone())
    }

    fn record_attempt(&self, attempt: &AttemptRecord) -> Result<()> {
        self.lock()?.attempts.push(attempt.clone());
        Ok(())
    }

    fn attempts(&self, problem_id: &str) -> Result<Vec<AttemptRecord>> {
        Ok(self
            .lock()?
            .attempts
            .iter()
            .filter(|a| a.problem_id == problem_id)
            .cloned()
            .collect())
    }
}
