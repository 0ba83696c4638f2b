// src/progress/sqlite.rs

//! SQLite-backed progress store.
//!
//! One row per problem; both per-question maps are stored as JSON text and
//! statuses as integers (untried 0, tried 1, complete 2).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use super::{AttemptRecord, ProgressRecord, ProgressStore};
use crate::errors::{KernelgateError, Result};
use crate::types::{QuestionId, QuestionStatus, ScoringKind};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS progress (
    problem_id       TEXT PRIMARY KEY,
    question_status  TEXT NOT NULL,
    question_content TEXT NOT NULL,
    problem_status   INTEGER NOT NULL DEFAULT 0,
    updated_at       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attempts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    problem_id  TEXT NOT NULL,
    question_id TEXT NOT NULL,
    kind        TEXT NOT NULL,
    content     TEXT NOT NULL,
    status      INTEGER NOT NULL,
    answered_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS attempts_by_problem ON attempts (problem_id);
";

#[derive(Debug, Clone)]
pub struct SqliteProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProgressStore {
    /// Open (or create) the database at `path`. `":memory:"` is accepted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "progress database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KernelgateError::Other(anyhow!("progress database lock poisoned")))
    }
}

fn status_from_db(value: i64) -> Result<QuestionStatus> {
    QuestionStatus::from_i64(value)
        .ok_or_else(|| KernelgateError::Other(anyhow!("invalid stored status {value}")))
}

fn read_record(conn: &Connection, problem_id: &str) -> Result<Option<ProgressRecord>> {
    let row = conn
        .query_row(
            "SELECT question_status, question_content, problem_status
             FROM progress WHERE problem_id = ?1",
            params![problem_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((status_json, content_json, problem_status)) = row else {
        return Ok(None);
    };

    let raw_status: BTreeMap<QuestionId, i64> = serde_json::from_str(&status_json)?;
    let question_status = raw_status
        .into_iter()
        .map(|(q, v)| status_from_db(v).map(|s| (q, s)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(Some(ProgressRecord {
        problem_id: problem_id.to_string(),
        question_status,
        question_content: serde_json::from_str(&content_json)?,
        problem_status: status_from_db(problem_status)?,
    }))
}

fn write_record(conn: &Connection, record: &ProgressRecord) -> Result<()> {
    let raw_status: BTreeMap<&str, i64> = record
        .question_status
        .iter()
        .map(|(q, s)| (q.as_str(), s.as_i64()))
        .collect();

    conn.execute(
        "INSERT INTO progress (problem_id, question_status, question_content, problem_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(problem_id) DO UPDATE SET
             question_status = excluded.question_status,
             question_content = excluded.question_content,
             problem_status = excluded.problem_status,
             updated_at = excluded.updated_at",
        params![
            record.problem_id,
            serde_json::to_string(&raw_status)?,
            serde_json::to_string(&record.question_content)?,
            record.problem_status.as_i64(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl ProgressStore for SqliteProgressStore {
    fn get(&self, problem_id: &str) -> Result<Option<ProgressRecord>> {
        let conn = self.lock()?;
        read_record(&conn, problem_id)
    }

    fn commit(
        &self,
        problem_id: &str,
        question_id: &str,
        status: QuestionStatus,
        content: Value,
        defined: &[QuestionId],
    ) -> Result<ProgressRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut record =
            read_record(&tx, problem_id)?.unwrap_or_else(|| ProgressRecord::new(problem_id));
        record.merge(question_id, status, content, defined);
        write_record(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }

    fn save_draft(
        &self,
        problem_id: &str,
        contents: BTreeMap<QuestionId, Value>,
    ) -> Result<ProgressRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut record =
            read_record(&tx, problem_id)?.unwrap_or_else(|| ProgressRecord::new(problem_id));
        record.apply_draft(contents);
        write_record(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }

    fn record_attempt(&self, attempt: &AttemptRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO attempts (problem_id, question_id, kind, content, status, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attempt.problem_id,
                attempt.question_id,
                attempt.kind.to_string(),
                attempt.content,
                attempt.status.as_i64(),
                attempt.answered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn attempts(&self, problem_id: &str) -> Result<Vec<AttemptRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT question_id, kind, content, status, answered_at
             FROM attempts WHERE problem_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![problem_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut attempts = Vec::new();
        for row in rows {
            let (question_id, kind, content, status, answered_at) = row?;
            let kind: ScoringKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            let answered_at = DateTime::parse_from_rfc3339(&answered_at)
                .map_err(|e| anyhow!("invalid attempt timestamp: {e}"))?
                .with_timezone(&Utc);
            attempts.push(AttemptRecord {
                problem_id: problem_id.to_string(),
                question_id,
                kind,
                content,
                status: status_from_db(status)?,
                answered_at,
            });
        }
        Ok(attempts)
    }
}
