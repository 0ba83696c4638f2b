// src/scoring/engine.rs

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::errors::{KernelgateError, Result};
use crate::progress::{AttemptRecord, ProgressStore};
use crate::scoring::executable::{ProgramExit, ProgramSpec, run_program};
use crate::scoring::jobs::JobTable;
use crate::scoring::literal::{render_results, score_literal};
use crate::scoring::{CANCELLED_MESSAGE, ScoreOutcome, ScoreRequest, Verdict};
use crate::types::{QuestionStatus, ScoringKind};

/// Runs scoring jobs and commits their verdicts.
///
/// Callers block for the whole run; jobs under different keys run
/// independently.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    catalog: Arc<Catalog>,
    progress: Arc<dyn ProgressStore>,
    jobs: JobTable,
    program: ProgramSpec,
}

impl ScoringEngine {
    pub fn new(catalog: Arc<Catalog>, progress: Arc<dyn ProgressStore>, program: ProgramSpec) -> Self {
        Self {
            catalog,
            progress,
            jobs: JobTable::new(),
            program,
        }
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn progress(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Score one submission, then merge the verdict into progress.
    pub async fn score(&self, request: ScoreRequest) -> Result<ScoreOutcome> {
        let ScoreRequest {
            problem_id,
            question_id,
            kind,
            submitted_answers,
            job_key,
        } = request;

        if self.jobs.is_active(&job_key) {
            return Err(KernelgateError::JobAlreadyRunning(job_key));
        }

        let question = self.catalog.question(&problem_id, &question_id)?;
        let defined = self.catalog.question_ids(&problem_id)?;
        info!(problem = %problem_id, question = %question_id, %kind, job_key = %job_key, "scoring submission");

        let (verdict, results, content) = match kind {
            ScoringKind::Literal => {
                let results = score_literal(&submitted_answers, &question.answers)?;
                let verdict = if results.iter().all(|ok| *ok) {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                };
                let content = render_results(&results);
                (verdict, results, content)
            }
            ScoringKind::Executable => {
                let (verdict, content) = self
                    .score_executable(&job_key, &submitted_answers, &question.answers)
                    .await?;
                (verdict, Vec::new(), content)
            }
        };

        let status = match verdict {
            Verdict::Pass => QuestionStatus::Complete,
            Verdict::Fail | Verdict::Cancelled => QuestionStatus::Tried,
        };
        let submitted = serde_json::to_value(&submitted_answers)?;

        let record = self.progress.commit(
            &problem_id,
            &question_id,
            status,
            submitted.clone(),
            &defined,
        )?;
        if let Err(e) = self.progress.record_attempt(&AttemptRecord {
            problem_id: problem_id.clone(),
            question_id: question_id.clone(),
            kind,
            content: submitted.to_string(),
            status,
            answered_at: Utc::now(),
        }) {
            // Progress is already committed; a missing log row is not fatal.
            warn!(problem = %problem_id, question = %question_id, error = %e, "failed to log attempt");
        }

        info!(
            problem = %problem_id,
            question = %question_id,
            ?verdict,
            problem_status = %record.problem_status,
            "scoring finished"
        );

        let explanation = match verdict {
            Verdict::Pass => question.explanation.clone(),
            _ => None,
        };

        Ok(ScoreOutcome {
            verdict,
            results,
            content,
            explanation,
            problem_status: record.problem_status,
        })
    }

    async fn score_executable(
        &self,
        job_key: &str,
        submitted: &[String],
        reference: &[String],
    ) -> Result<(Verdict, String)> {
        // Held until this function returns, whatever the outcome.
        let mut slot = self.jobs.try_register(job_key)?;

        let source = submitted
            .iter()
            .chain(reference)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let output = run_program(&self.program, &source, slot.cancel_signal()).await?;

        Ok(match output.exit {
            ProgramExit::Success => (
                Verdict::Pass,
                format!("Complete\n\n[output]\n{}", output.stdout),
            ),
            ProgramExit::Killed => (Verdict::Cancelled, CANCELLED_MESSAGE.to_string()),
            ProgramExit::Failed(code) => {
                info!(job_key = %job_key, ?code, "submission failed its tests");
                (Verdict::Fail, output.stderr)
            }
        })
    }

    /// Kill the job under `job_key`, if any. Always succeeds.
    pub fn cancel(&self, job_key: &str) -> bool {
        self.jobs.cancel(job_key)
    }

    /// Kill every running job and wait until each has released its slot.
    pub async fn shutdown(&self) {
        let signalled = self.jobs.cancel_all();
        if signalled > 0 {
            info!(jobs = signalled, "cancelling active scoring jobs");
        }
        self.jobs.wait_drained().await;
    }
}
