//! Integration tests for `/api/v1/jobs`.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{body_json, get, post_json, post_raw};
use pagesmith_core::types::JobId;
use pagesmith_db::models::job::JobStatus;
use pagesmith_db::repositories::JobRepo;
use pagesmith_db::MemoryStore;

#[tokio::test]
async fn create_queues_the_job_and_returns_its_id() {
    let store = Arc::new(MemoryStore::new());
    let app = common::build_test_app(store.clone());

    let response = post_json(
        app,
        "/api/v1/jobs",
        &json!({
            "prompt": "make the header blue",
            "files": {"index.html": "<body><h1>Hi</h1></body>"},
            "preset": "landing"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "queued");
    let id: JobId = json["data"]["id"].as_str().unwrap().parse().unwrap();

    let job = JobRepo::find_by_id(store.as_ref(), id).await.unwrap().unwrap();
    assert_eq!(job.payload.prompt, "make the header blue");
    assert_eq!(job.payload.preset.as_deref(), Some("landing"));
    assert_eq!(JobRepo::pop_next(store.as_ref()).await.unwrap(), Some(id));
}

#[tokio::test]
async fn empty_prompt_is_a_validation_error() {
    let store = Arc::new(MemoryStore::new());
    let app = common::build_test_app(store.clone());

    let response = post_json(app, "/api/v1/jobs", &json!({"prompt": ""})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert_eq!(JobRepo::queue_len(store.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = common::build_test_app(Arc::new(MemoryStore::new()));
    let response = post_raw(app, "/api/v1/jobs", "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn status_returns_result_and_bounded_log_tail() {
    let store = Arc::new(MemoryStore::new());
    let mut job = JobRepo::create(store.as_ref(), Default::default()).await.unwrap();
    job.transition(JobStatus::Running).unwrap();
    for i in 0..5 {
        job.log(format!("step {i}"));
    }
    job.complete(json!({"model": "A", "files": {"index.html": "<p>x</p>"}}))
        .unwrap();
    JobRepo::save(store.as_ref(), &mut job).await.unwrap();

    let app = common::build_test_app(store);
    let response = get(app, &format!("/api/v1/jobs/{}", job.id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = &body_json(response).await["data"];
    assert_eq!(data["status"], "done");
    assert_eq!(data["result"]["model"], "A");
    assert!(data["error"].is_null());
    let logs: Vec<&str> = data["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["message"].as_str().unwrap())
        .collect();
    // test_config keeps the last three entries.
    assert_eq!(logs, ["step 2", "step 3", "step 4"]);
}

#[tokio::test]
async fn unknown_or_malformed_id_is_not_found() {
    let app = common::build_test_app(Arc::new(MemoryStore::new()));

    let response = get(app.clone(), &format!("/api/v1/jobs/{}", uuid::Uuid::now_v7())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = get(app, "/api/v1/jobs/not-an-id").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
