// src/api.rs

//! Request facade for an outer HTTP (or any other) layer.
//!
//! Each function performs one external operation against a [`Backend`] and
//! returns an [`ApiResponse`]: a status code plus a JSON body. Routing and
//! body extraction stay with the caller.
//!
//! | operation                       | success | errors                   |
//! |---------------------------------|---------|--------------------------|
//! | `POST /sessions[/<id>]`         | 200     | 409 duplicate            |
//! | `POST /sessions/<id>/restart`   | 200     | 404                      |
//! | `POST /sessions/<id>/interrupt` | 200     | 404                      |
//! | `DELETE /sessions[/<id>]`       | 200     | 404                      |
//! | `GET /sessions[/<id>]`          | 200     |                          |
//! | `POST /problems/<p>/scoring`    | 200     | 202 running, 400, 404    |
//! | `POST /problems/<p>/cancel`     | 200     | 400 missing job key      |

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::errors::{KernelgateError, Result};
use crate::progress::ProgressRecord;
use crate::scoring::ScoreRequest;
use crate::service::Backend;
use crate::types::{JobKey, QuestionId, ScoringKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Status code for an error. Unexpected faults are 500.
pub fn status_code(err: &KernelgateError) -> u16 {
    match err {
        KernelgateError::SessionNotFound(_)
        | KernelgateError::ProblemNotFound(_)
        | KernelgateError::QuestionNotFound { .. } => 404,
        KernelgateError::DuplicateSession(_) => 409,
        KernelgateError::JobAlreadyRunning(_) => 202,
        KernelgateError::InvalidSubmission(_) => 400,
        _ => 500,
    }
}

impl From<KernelgateError> for ApiResponse {
    fn from(err: KernelgateError) -> Self {
        let status = status_code(&err);
        let description = match &err {
            KernelgateError::JobAlreadyRunning(_) => "Accepted (scoring in progress)".to_string(),
            _ if !err.is_client_error() => {
                error!(error = %err, "internal error while handling request");
                "Internal server error".to_string()
            }
            _ => err.to_string(),
        };
        Self {
            status,
            body: json!({ "description": description }),
        }
    }
}

fn respond(result: Result<Value>) -> ApiResponse {
    match result {
        Ok(body) => ApiResponse::ok(body),
        Err(err) => err.into(),
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Value) -> Result<T> {
    T::deserialize(body)
        .map_err(|e| KernelgateError::InvalidSubmission(format!("invalid request body: {e}")))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub async fn start_session(backend: &Backend, session_id: Option<&str>) -> ApiResponse {
    respond(start_session_inner(backend, session_id).await)
}

async fn start_session_inner(backend: &Backend, session_id: Option<&str>) -> Result<Value> {
    let id = backend.sessions.start(session_id.map(str::to_string)).await?;
    Ok(json!({ "sessionId": id, "description": "Session started" }))
}

pub async fn restart_session(backend: &Backend, session_id: &str) -> ApiResponse {
    match backend.sessions.restart(session_id).await {
        Ok(()) => ApiResponse::ok(json!({
            "sessionId": session_id,
            "description": "Session restarted",
        })),
        Err(e) => e.into(),
    }
}

pub async fn interrupt_session(backend: &Backend, session_id: &str) -> ApiResponse {
    match backend.sessions.interrupt(session_id).await {
        Ok(()) => ApiResponse::ok(json!({
            "sessionId": session_id,
            "description": "Session interrupted",
        })),
        Err(e) => e.into(),
    }
}

/// Stop one session, or every session when `session_id` is `None`.
pub async fn stop_session(backend: &Backend, session_id: Option<&str>) -> ApiResponse {
    let Some(id) = session_id else {
        backend.sessions.stop_all().await;
        return ApiResponse::ok(json!({ "description": "All sessions shut down" }));
    };
    match backend.sessions.stop(id).await {
        Ok(()) => ApiResponse::ok(json!({ "sessionId": id, "description": "Session shut down" })),
        Err(e) => e.into(),
    }
}

/// Liveness of one session (unknown ids are simply not alive), or the list
/// of registered ids when `session_id` is `None`.
pub async fn get_session(backend: &Backend, session_id: Option<&str>) -> ApiResponse {
    match session_id {
        Some(id) => ApiResponse::ok(json!({
            "sessionId": id,
            "isAlive": backend.sessions.is_alive(id).await,
            "description": "Session state",
        })),
        None => ApiResponse::ok(json!({
            "sessionIds": backend.sessions.list().await,
            "description": "Registered sessions",
        })),
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoringBody {
    question_id: QuestionId,
    kind: ScoringKind,
    submitted_answers: Vec<String>,
    job_key: JobKey,
}

pub async fn score(backend: &Backend, problem_id: &str, body: &Value) -> ApiResponse {
    respond(score_inner(backend, problem_id, body).await)
}

async fn score_inner(backend: &Backend, problem_id: &str, body: &Value) -> Result<Value> {
    let body: ScoringBody = parse_body(body)?;
    let question_id = body.question_id;
    let outcome = backend
        .scoring
        .score(ScoreRequest {
            problem_id: problem_id.to_string(),
            question_id: question_id.clone(),
            kind: body.kind,
            submitted_answers: body.submitted_answers,
            job_key: body.job_key,
        })
        .await?;

    let mut value = serde_json::to_value(&outcome)?;
    if let Value::Object(map) = &mut value {
        map.insert("problemId".to_string(), json!(problem_id));
        map.insert("questionId".to_string(), json!(question_id));
        map.insert("description".to_string(), json!("Scoring question"));
    }
    Ok(value)
}

/// Cancel the scoring job under `job_key`. Idempotent.
pub fn cancel_scoring(backend: &Backend, problem_id: &str, job_key: Option<&str>) -> ApiResponse {
    let Some(job_key) = job_key else {
        return KernelgateError::InvalidSubmission("missing 'jobKey' parameter".to_string()).into();
    };
    let cancelled = backend.scoring.cancel(job_key);
    debug!(problem = %problem_id, job_key = %job_key, cancelled, "cancel request");
    ApiResponse::ok(json!({ "description": "Code scoring is cancelled" }))
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftBody {
    question_content: BTreeMap<QuestionId, Value>,
}

pub fn save_draft(backend: &Backend, problem_id: &str, body: &Value) -> ApiResponse {
    respond(save_draft_inner(backend, problem_id, body))
}

fn save_draft_inner(backend: &Backend, problem_id: &str, body: &Value) -> Result<Value> {
    backend.catalog().problem(problem_id)?;
    let body: DraftBody = parse_body(body)?;
    let record = backend.progress().save_draft(problem_id, body.question_content)?;
    Ok(json!({ "progress": record, "description": "Draft saved" }))
}

/// Stored progress for `problem_id`; an untouched problem reads as untried.
pub fn get_progress(backend: &Backend, problem_id: &str) -> ApiResponse {
    respond(get_progress_inner(backend, problem_id))
}

fn get_progress_inner(backend: &Backend, problem_id: &str) -> Result<Value> {
    backend.catalog().problem(problem_id)?;
    let record = backend
        .progress()
        .get(problem_id)?
        .unwrap_or_else(|| ProgressRecord::new(problem_id));
    Ok(json!({ "progress": record, "description": "Progress" }))
}
