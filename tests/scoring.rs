mod common;
use crate::common::{TestResult, eventually};

use std::path::Path;
use std::time::{Duration, Instant};

use kernelgate::errors::KernelgateError;
use kernelgate::progress::ProgressStore;
use kernelgate::scoring::{CANCELLED_MESSAGE, ScoreRequest, ScoringEngine, Verdict};
use kernelgate::types::{QuestionStatus, ScoringKind};
use kernelgate_test_utils::builders::CatalogBuilder;
use kernelgate_test_utils::{init_tracing, shell_backend, with_timeout};

fn request(question: &str, kind: ScoringKind, answers: &[&str], job_key: &str) -> ScoreRequest {
    ScoreRequest {
        problem_id: "P".to_string(),
        question_id: question.to_string(),
        kind,
        submitted_answers: answers.iter().map(|s| s.to_string()).collect(),
        job_key: job_key.to_string(),
    }
}

/// Poll until `key` holds a slot in the engine's job table.
async fn wait_active(engine: &ScoringEngine, key: &str) -> bool {
    eventually(Duration::from_secs(3), || {
        let active = engine.jobs().is_active(key);
        async move { active }
    })
    .await
}

#[tokio::test]
async fn literal_scoring_drives_problem_to_complete() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new()
        .question("P", "1", &["4"])
        .question("P", "2", &["a", "b"])
        .build();
    let (backend, progress) = shell_backend(catalog);

    let outcome = backend
        .scoring
        .score(request("1", ScoringKind::Literal, &["4"], "k1"))
        .await?;
    assert_eq!(outcome.verdict, Verdict::Pass);
    assert_eq!(outcome.results, vec![true]);
    assert_eq!(outcome.content, "[1] o");
    assert_eq!(outcome.problem_status, QuestionStatus::Tried);

    let outcome = backend
        .scoring
        .score(request("2", ScoringKind::Literal, &["a", "x"], "k2"))
        .await?;
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(outcome.content, "[1] o\n[2] x");
    assert_eq!(outcome.problem_status, QuestionStatus::Tried);

    let outcome = backend
        .scoring
        .score(request("2", ScoringKind::Literal, &["a", "b"], "k2"))
        .await?;
    assert_eq!(outcome.verdict, Verdict::Pass);
    assert_eq!(outcome.problem_status, QuestionStatus::Complete);

    let record = progress.get("P")?.ok_or("no progress record")?;
    assert_eq!(record.question_status["1"], QuestionStatus::Complete);
    assert_eq!(record.question_status["2"], QuestionStatus::Complete);
    assert_eq!(record.question_content["2"], serde_json::json!(["a", "b"]));
    assert_eq!(progress.attempts("P")?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn literal_length_mismatch_is_rejected_without_commit() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["a", "b"]).build();
    let (backend, progress) = shell_backend(catalog);

    let result = backend
        .scoring
        .score(request("1", ScoringKind::Literal, &["a"], "k"))
        .await;
    assert!(matches!(result, Err(KernelgateError::InvalidSubmission(_))));
    assert!(progress.get("P")?.is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_question_is_not_found() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["a"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let result = backend
        .scoring
        .score(request("9", ScoringKind::Literal, &["a"], "k"))
        .await;
    assert!(matches!(result, Err(KernelgateError::QuestionNotFound { .. })));

    let mut other = request("1", ScoringKind::Literal, &["a"], "k");
    other.problem_id = "nope".to_string();
    let result = backend.scoring.score(other).await;
    assert!(matches!(result, Err(KernelgateError::ProblemNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn executable_pass_reports_output_and_explanation() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new()
        .explained_question(
            "P",
            "1",
            &["test \"$x\" = 1", "echo checked"],
            "x must be one",
        )
        .build();
    let (backend, _progress) = shell_backend(catalog);

    let outcome = with_timeout(
        backend
            .scoring
            .score(request("1", ScoringKind::Executable, &["x=1"], "job")),
    )
    .await?;

    assert_eq!(outcome.verdict, Verdict::Pass);
    assert_eq!(outcome.content, "Complete\n\n[output]\nchecked\n");
    assert_eq!(outcome.explanation.as_deref(), Some("x must be one"));
    assert_eq!(outcome.problem_status, QuestionStatus::Complete);
    assert!(backend.scoring.jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn executable_failure_returns_stderr() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new()
        .explained_question(
            "P",
            "1",
            &["test \"$x\" = 1 || { echo 'x is wrong' >&2; exit 1; }"],
            "hidden until solved",
        )
        .build();
    let (backend, progress) = shell_backend(catalog);

    let outcome = with_timeout(
        backend
            .scoring
            .score(request("1", ScoringKind::Executable, &["x=2"], "job")),
    )
    .await?;

    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(outcome.content, "x is wrong\n");
    assert!(outcome.explanation.is_none());
    assert_eq!(outcome.problem_status, QuestionStatus::Tried);
    assert!(!backend.scoring.jobs().is_active("job"));

    let record = progress.get("P")?.ok_or("no progress record")?;
    assert_eq!(record.question_status["1"], QuestionStatus::Tried);
    Ok(())
}

#[tokio::test]
async fn cancel_kills_running_job() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["true"]).build();
    let (backend, progress) = shell_backend(catalog);

    let running = {
        let engine = backend.scoring.clone();
        tokio::spawn(async move {
            engine
                .score(request("1", ScoringKind::Executable, &["sleep 5"], "slow"))
                .await
        })
    };
    assert!(wait_active(&backend.scoring, "slow").await);

    assert!(backend.scoring.cancel("slow"));
    let outcome = with_timeout(running).await??;

    assert_eq!(outcome.verdict, Verdict::Cancelled);
    assert_eq!(outcome.content, CANCELLED_MESSAGE);
    assert!(!backend.scoring.jobs().is_active("slow"));

    let record = progress.get("P")?.ok_or("no progress record")?;
    assert_eq!(record.question_status["1"], QuestionStatus::Tried);

    // Cancelling an idle key is a no-op.
    assert!(!backend.scoring.cancel("slow"));
    Ok(())
}

#[tokio::test]
async fn same_key_cannot_run_twice() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["true"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let running = {
        let engine = backend.scoring.clone();
        tokio::spawn(async move {
            engine
                .score(request("1", ScoringKind::Executable, &["sleep 5"], "dup"))
                .await
        })
    };
    assert!(wait_active(&backend.scoring, "dup").await);

    let second = backend
        .scoring
        .score(request("1", ScoringKind::Executable, &["true"], "dup"))
        .await;
    match second {
        Err(KernelgateError::JobAlreadyRunning(key)) => assert_eq!(key, "dup"),
        other => panic!("Expected JobAlreadyRunning, got: {:?}", other),
    }

    // A different key is independent.
    let other = with_timeout(
        backend
            .scoring
            .score(request("1", ScoringKind::Executable, &["true"], "other")),
    )
    .await?;
    assert_eq!(other.verdict, Verdict::Pass);

    backend.scoring.cancel("dup");
    with_timeout(running).await??;
    assert!(backend.scoring.jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_and_drains_all_jobs() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["true"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let mut handles = Vec::new();
    for key in ["a", "b"] {
        let engine = backend.scoring.clone();
        handles.push(tokio::spawn(async move {
            engine
                .score(request("1", ScoringKind::Executable, &["sleep 5"], key))
                .await
        }));
    }
    assert!(wait_active(&backend.scoring, "a").await);
    assert!(wait_active(&backend.scoring, "b").await);

    with_timeout(backend.scoring.shutdown()).await;
    assert!(backend.scoring.jobs().is_empty());

    for handle in handles {
        let outcome = with_timeout(handle).await??;
        assert_eq!(outcome.verdict, Verdict::Cancelled);
    }
    Ok(())
}

#[tokio::test]
async fn background_process_does_not_hold_the_job_key() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["true"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let started = Instant::now();
    let outcome = with_timeout(
        backend
            .scoring
            .score(request("1", ScoringKind::Executable, &["sleep 30 &"], "bg")),
    )
    .await?;

    assert_eq!(outcome.verdict, Verdict::Pass);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!backend.scoring.jobs().is_active("bg"));
    assert!(!backend.scoring.cancel("bg"));

    // The key is free for the next submission.
    let again = with_timeout(
        backend
            .scoring
            .score(request("1", ScoringKind::Executable, &["true"], "bg")),
    )
    .await?;
    assert_eq!(again.verdict, Verdict::Pass);
    Ok(())
}

#[tokio::test]
async fn cancel_while_output_is_held_outside_the_group() -> TestResult {
    init_tracing();
    if !["/usr/bin/setsid", "/bin/setsid"]
        .iter()
        .any(|p| Path::new(p).exists())
    {
        eprintln!("setsid not installed; skipping");
        return Ok(());
    }
    let catalog = CatalogBuilder::new().question("P", "1", &["true"]).build();
    let (backend, _progress) = shell_backend(catalog);

    // The new session escapes the process group but keeps the pipes open.
    let running = {
        let engine = backend.scoring.clone();
        tokio::spawn(async move {
            engine
                .score(request("1", ScoringKind::Executable, &["setsid sleep 3 &"], "held"))
                .await
        })
    };
    assert!(wait_active(&backend.scoring, "held").await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let cancelled_at = Instant::now();
    assert!(backend.scoring.cancel("held"));
    let outcome = with_timeout(running).await??;

    assert_eq!(outcome.verdict, Verdict::Cancelled);
    assert_eq!(outcome.content, CANCELLED_MESSAGE);
    assert!(cancelled_at.elapsed() < Duration::from_secs(2));
    assert!(!backend.scoring.jobs().is_active("held"));
    with_timeout(backend.scoring.shutdown()).await;
    Ok(())
}
