// src/catalog.rs

//! Problem catalog: the reference answers graded against, and the set of
//! questions each problem defines.
//!
//! Problem authoring lives elsewhere; this crate only reads a TOML export:
//!
//! ```toml
//! [problem.P1]
//! title = "Variables"
//!
//! [problem.P1.question.1]
//! answers = ["x", "y"]
//! explanation = "Both names are bound in the first cell."
//!
//! [problem.P1.question.2]
//! answers = ["assert total == 10"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{KernelgateError, Result};
use crate::types::{ProblemId, QuestionId};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub problem: BTreeMap<ProblemId, ProblemSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProblemSpec {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub question: BTreeMap<QuestionId, QuestionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSpec {
    /// Literal answers, or reference test code lines for executable scoring.
    pub answers: Vec<String>,

    /// Shown to the learner once the question is passed.
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Catalog {
    /// Read and validate a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let catalog: Catalog = toml::from_str(&contents)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Like [`Catalog::load`], but a missing file yields an empty catalog.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "catalog file not found; no problems can be scored");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        for (p_id, problem) in &self.problem {
            if problem.question.is_empty() {
                return Err(KernelgateError::ConfigError(format!(
                    "problem '{p_id}' defines no questions"
                )));
            }
            for (q_id, question) in &problem.question {
                if question.answers.is_empty() {
                    return Err(KernelgateError::ConfigError(format!(
                        "question '{q_id}' in problem '{p_id}' has no reference answers"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn problem(&self, problem_id: &str) -> Result<&ProblemSpec> {
        self.problem
            .get(problem_id)
            .ok_or_else(|| KernelgateError::ProblemNotFound(problem_id.to_string()))
    }

    /// Reference answers for `(problem, question)`.
    pub fn question(&self, problem_id: &str, question_id: &str) -> Result<&QuestionSpec> {
        self.problem(problem_id)?
            .question
            .get(question_id)
            .ok_or_else(|| KernelgateError::QuestionNotFound {
                problem: problem_id.to_string(),
                question: question_id.to_string(),
            })
    }

    /// Every question id the problem currently defines.
    pub fn question_ids(&self, problem_id: &str) -> Result<Vec<QuestionId>> {
        Ok(self.problem(problem_id)?.question.keys().cloned().collect())
    }
}
