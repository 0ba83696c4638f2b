mod common;
use crate::common::{TestResult, eventually};

use std::time::Duration;

use serde_json::json;

use kernelgate::api;
use kernelgate_test_utils::builders::CatalogBuilder;
use kernelgate_test_utils::{init_tracing, shell_backend, with_timeout};

#[tokio::test]
async fn session_lifecycle_status_codes() -> TestResult {
    init_tracing();
    let (backend, _progress) = shell_backend(CatalogBuilder::new().build());

    let started = api::start_session(&backend, Some("s1")).await;
    assert_eq!(started.status, 200);
    assert_eq!(started.body["sessionId"], "s1");

    let duplicate = api::start_session(&backend, Some("s1")).await;
    assert_eq!(duplicate.status, 409);
    assert!(duplicate.body["description"].is_string());

    let alive = api::get_session(&backend, Some("s1")).await;
    assert_eq!(alive.body["isAlive"], true);

    assert_eq!(api::interrupt_session(&backend, "s1").await.status, 200);
    assert_eq!(api::restart_session(&backend, "s1").await.status, 200);

    let listed = api::get_session(&backend, None).await;
    assert_eq!(listed.body["sessionIds"], json!(["s1"]));

    assert_eq!(api::stop_session(&backend, Some("s1")).await.status, 200);
    assert_eq!(api::stop_session(&backend, Some("s1")).await.status, 404);
    Ok(())
}

#[tokio::test]
async fn unknown_sessions() -> TestResult {
    init_tracing();
    let (backend, _progress) = shell_backend(CatalogBuilder::new().build());

    // Liveness of an unknown id is a plain "no", not an error.
    let response = api::get_session(&backend, Some("ghost")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["isAlive"], false);

    assert_eq!(api::restart_session(&backend, "ghost").await.status, 404);
    assert_eq!(api::interrupt_session(&backend, "ghost").await.status, 404);
    Ok(())
}

#[tokio::test]
async fn stop_without_id_stops_everything() -> TestResult {
    init_tracing();
    let (backend, _progress) = shell_backend(CatalogBuilder::new().build());

    let generated = api::start_session(&backend, None).await;
    let id = generated.body["sessionId"]
        .as_str()
        .ok_or("no generated id")?
        .to_string();
    api::start_session(&backend, Some("other")).await;

    assert_eq!(api::stop_session(&backend, None).await.status, 200);
    assert_eq!(api::get_session(&backend, Some(&id)).await.body["isAlive"], false);
    assert_eq!(api::get_session(&backend, None).await.body["sessionIds"], json!([]));
    Ok(())
}

#[tokio::test]
async fn scoring_request_round_trip() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["a", "b"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let body = json!({
        "questionId": "1",
        "kind": "word",
        "submittedAnswers": ["a", "c"],
        "jobKey": "k",
    });
    let response = api::score(&backend, "P", &body).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["verdict"], "fail");
    assert_eq!(response.body["content"], "[1] o\n[2] x");
    assert_eq!(response.body["results"], json!([true, false]));
    assert_eq!(response.body["problemStatus"], "tried");
    assert_eq!(response.body["problemId"], "P");

    let progress = api::get_progress(&backend, "P");
    assert_eq!(progress.status, 200);
    assert_eq!(progress.body["progress"]["questionStatus"]["1"], "tried");
    assert_eq!(
        progress.body["progress"]["questionContent"]["1"],
        json!(["a", "c"])
    );
    Ok(())
}

#[tokio::test]
async fn scoring_errors_map_to_status_codes() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["a", "b"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let mismatch = json!({
        "questionId": "1",
        "kind": "literal",
        "submittedAnswers": ["a"],
        "jobKey": "k",
    });
    assert_eq!(api::score(&backend, "P", &mismatch).await.status, 400);

    let malformed = json!({ "questionId": "1" });
    assert_eq!(api::score(&backend, "P", &malformed).await.status, 400);

    let unknown = json!({
        "questionId": "9",
        "kind": "literal",
        "submittedAnswers": ["a"],
        "jobKey": "k",
    });
    assert_eq!(api::score(&backend, "P", &unknown).await.status, 404);
    assert_eq!(api::score(&backend, "nope", &unknown).await.status, 404);
    assert_eq!(api::get_progress(&backend, "nope").status, 404);
    Ok(())
}

#[tokio::test]
async fn busy_job_key_is_accepted_then_cancelled() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["true"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let slow = json!({
        "questionId": "1",
        "kind": "code",
        "submittedAnswers": ["sleep 5"],
        "jobKey": "learner",
    });
    let running = {
        let backend = backend.clone();
        let slow = slow.clone();
        tokio::spawn(async move { api::score(&backend, "P", &slow).await })
    };
    let active = eventually(Duration::from_secs(3), || {
        let active = backend.scoring.jobs().is_active("learner");
        async move { active }
    })
    .await;
    assert!(active);

    let busy = api::score(&backend, "P", &slow).await;
    assert_eq!(busy.status, 202);
    assert_eq!(busy.body["description"], "Accepted (scoring in progress)");

    assert_eq!(api::cancel_scoring(&backend, "P", None).status, 400);
    assert_eq!(api::cancel_scoring(&backend, "P", Some("learner")).status, 200);

    let finished = with_timeout(running).await?;
    assert_eq!(finished.status, 200);
    assert_eq!(finished.body["verdict"], "cancelled");
    assert_eq!(finished.body["content"], "Code scoring has been cancelled.");

    // Cancelling again is harmless.
    assert_eq!(api::cancel_scoring(&backend, "P", Some("learner")).status, 200);
    Ok(())
}

#[tokio::test]
async fn drafts_are_saved_for_known_problems() -> TestResult {
    init_tracing();
    let catalog = CatalogBuilder::new().question("P", "1", &["a"]).build();
    let (backend, _progress) = shell_backend(catalog);

    let untouched = api::get_progress(&backend, "P");
    assert_eq!(untouched.body["progress"]["problemStatus"], "untried");

    let draft = json!({ "questionContent": { "1": "half an answer" } });
    let saved = api::save_draft(&backend, "P", &draft);
    assert_eq!(saved.status, 200);
    assert_eq!(saved.body["progress"]["problemStatus"], "tried");

    assert_eq!(api::save_draft(&backend, "nope", &draft).status, 404);
    assert_eq!(api::save_draft(&backend, "P", &json!({})).status, 400);
    Ok(())
}
