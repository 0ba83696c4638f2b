mod common;
use crate::common::TestResult;

use std::collections::BTreeMap;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;

use kernelgate::progress::{
    AttemptRecord, MemoryProgressStore, ProgressRecord, ProgressStore, SqliteProgressStore,
};
use kernelgate::types::{QuestionId, QuestionStatus, ScoringKind};

fn defined(n: u8) -> Vec<QuestionId> {
    (0..n).map(|i| i.to_string()).collect()
}

fn status_of(passed: bool) -> QuestionStatus {
    if passed {
        QuestionStatus::Complete
    } else {
        QuestionStatus::Tried
    }
}

proptest! {
    /// Commits to distinct questions commute.
    #[test]
    fn commit_order_does_not_matter(graded in prop::collection::btree_map(0u8..6, any::<bool>(), 0..6)) {
        let ids = defined(6);
        let forward = MemoryProgressStore::new();
        let backward = MemoryProgressStore::new();

        for (q, passed) in &graded {
            forward.commit("P", &q.to_string(), status_of(*passed), json!([q]), &ids).unwrap();
        }
        for (q, passed) in graded.iter().rev() {
            backward.commit("P", &q.to_string(), status_of(*passed), json!([q]), &ids).unwrap();
        }

        prop_assert_eq!(forward.get("P").unwrap(), backward.get("P").unwrap());
    }

    /// Complete exactly when every defined question is complete.
    #[test]
    fn problem_status_follows_question_statuses(graded in prop::collection::btree_map(0u8..4, any::<bool>(), 0..5)) {
        let ids = defined(4);
        let mut record = ProgressRecord::new("P");
        for (q, passed) in &graded {
            record.merge(&q.to_string(), status_of(*passed), json!(null), &ids);
        }

        let expected = if graded.len() == 4 && graded.values().all(|p| *p) {
            QuestionStatus::Complete
        } else if graded.is_empty() {
            QuestionStatus::Untried
        } else {
            QuestionStatus::Tried
        };
        prop_assert_eq!(record.problem_status, expected);
    }
}

#[test]
fn commit_leaves_other_questions_untouched() -> TestResult {
    let store = MemoryProgressStore::new();
    let ids = defined(2);

    store.commit("P", "0", QuestionStatus::Complete, json!(["first"]), &ids)?;
    let record = store.commit("P", "1", QuestionStatus::Tried, json!(["second"]), &ids)?;

    assert_eq!(record.question_status["0"], QuestionStatus::Complete);
    assert_eq!(record.question_content["0"], json!(["first"]));
    assert_eq!(record.problem_status, QuestionStatus::Tried);
    Ok(())
}

#[test]
fn removed_question_does_not_block_completion() -> TestResult {
    let store = MemoryProgressStore::new();

    store.commit("P", "old", QuestionStatus::Tried, json!([]), &defined(1))?;
    let record = store.commit("P", "0", QuestionStatus::Complete, json!([]), &defined(1))?;

    assert_eq!(record.problem_status, QuestionStatus::Complete);
    Ok(())
}

#[test]
fn sqlite_progress_survives_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("progress.db");
    let ids = defined(2);

    {
        let store = SqliteProgressStore::open(&path)?;
        store.commit("P", "0", QuestionStatus::Complete, json!(["x=1"]), &ids)?;
        store.record_attempt(&AttemptRecord {
            problem_id: "P".to_string(),
            question_id: "0".to_string(),
            kind: ScoringKind::Executable,
            content: "[\"x=1\"]".to_string(),
            status: QuestionStatus::Complete,
            answered_at: Utc::now(),
        })?;
    }

    let store = SqliteProgressStore::open(&path)?;
    let record = store.get("P")?.ok_or("record was not persisted")?;
    assert_eq!(record.question_status["0"], QuestionStatus::Complete);
    assert_eq!(record.question_content["0"], json!(["x=1"]));
    assert_eq!(record.problem_status, QuestionStatus::Tried);

    let attempts = store.attempts("P")?;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].kind, ScoringKind::Executable);

    let record = store.commit("P", "1", QuestionStatus::Complete, json!(["y"]), &ids)?;
    assert_eq!(record.problem_status, QuestionStatus::Complete);
    Ok(())
}

#[test]
fn drafts_replace_content_but_keep_statuses() -> TestResult {
    let stores: Vec<Box<dyn ProgressStore>> = vec![
        Box::new(MemoryProgressStore::new()),
        Box::new(SqliteProgressStore::open_in_memory()?),
    ];

    for store in stores {
        let record = store.save_draft("P", BTreeMap::from([("0".to_string(), json!("draft"))]))?;
        assert_eq!(record.problem_status, QuestionStatus::Tried);
        assert!(record.question_status.is_empty());

        store.commit("P", "0", QuestionStatus::Complete, json!(["done"]), &defined(1))?;
        let record = store.save_draft("P", BTreeMap::from([("0".to_string(), json!("edit"))]))?;
        assert_eq!(record.problem_status, QuestionStatus::Complete);
        assert_eq!(record.question_status["0"], QuestionStatus::Complete);
        assert_eq!(record.question_content["0"], json!("edit"));

        let stored = store.get("P")?.ok_or("draft was not stored")?;
        assert_eq!(stored, record);
    }
    Ok(())
}
