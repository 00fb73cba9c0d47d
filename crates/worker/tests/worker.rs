//! Integration tests for job processing against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{config, enqueue, log_messages, reload, site_reply, worker, FlakyStore, Script, ScriptedBackend};
use pagesmith_db::models::job::JobStatus;
use pagesmith_db::repositories::JobRepo;
use pagesmith_db::{KvStore, MemoryStore};
use pagesmith_worker::Worker;

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn falls_back_until_a_model_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[
        ("A", Script::Fail(500)),
        ("B", Script::Reply(json!({"styles.css": "no index"}))),
        ("C", Script::Reply(site_reply())),
    ]));
    let job = enqueue(&store, "make it blue").await;

    assert!(worker(&store, &backend, "A,B,C").run_once().await.unwrap());

    let job = reload(&store, &job).await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(backend.calls(), ["A", "B", "C"]);

    let logs = log_messages(&job);
    assert!(logs.iter().any(|l| l.starts_with("A failed") && l.contains("500")));
    assert!(logs.iter().any(|l| l.starts_with("B failed") && l.contains("index.html")));
    assert!(!logs.iter().any(|l| l.starts_with("C failed")));

    let result = job.result.unwrap();
    assert_eq!(result["model"], "C");
    assert_eq!(result["mode"], "files");
    assert_eq!(result["files"]["index.html"], "<body><h1>Generated</h1></body>");
    assert_eq!(job.error, None);
}

#[tokio::test]
async fn first_success_stops_the_chain() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[
        ("A", Script::Reply(site_reply())),
        ("B", Script::Reply(site_reply())),
    ]));
    let job = enqueue(&store, "p").await;

    worker(&store, &backend, "A,B").run_once().await.unwrap();

    assert_eq!(backend.calls(), ["A"]);
    assert_eq!(reload(&store, &job).await.status, JobStatus::Done);
}

#[tokio::test]
async fn exhausted_chain_ends_in_error_with_last_failure() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[
        ("A", Script::Fail(503)),
        ("B", Script::Reply(json!("plain text"))),
    ]));
    let job = enqueue(&store, "p").await;

    worker(&store, &backend, "A,B").run_once().await.unwrap();

    let job = reload(&store, &job).await;
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.result, None);
    let error = job.error.unwrap();
    assert!(error.starts_with("B:"), "error: {error}");
}

#[tokio::test]
async fn hung_backend_times_out_and_chain_advances() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[
        ("slow", Script::Hang),
        ("fast", Script::Reply(site_reply())),
    ]));
    let job = enqueue(&store, "p").await;

    worker(&store, &backend, "slow,fast").run_once().await.unwrap();

    let job = reload(&store, &job).await;
    assert_eq!(job.status, JobStatus::Done);
    assert!(log_messages(&job).iter().any(|l| l.starts_with("slow failed") && l.contains("Timed out")));
}

// ---------------------------------------------------------------------------
// Patch output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ops_output_is_applied_to_current_files() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[(
        "A",
        Script::Reply(json!({
            "ops": [
                {"op": "replace_text", "selector": "h1", "text": "New"},
                {"op": "replace_text", "selector": "nav", "text": "gone"},
                {"op": "upsert_style", "selector": "h1", "rules": "color: red"}
            ]
        })),
    )]));
    let job = enqueue(&store, "p").await;

    worker(&store, &backend, "A").run_once().await.unwrap();

    let job = reload(&store, &job).await;
    assert_eq!(job.status, JobStatus::Done);
    let result = job.result.unwrap();
    assert_eq!(result["mode"], "patch");
    assert_eq!(result["changed"], 2);
    assert_eq!(result["files"]["index.html"], "<body><nav>n</nav><h1>New</h1></body>");
    assert_eq!(result["files"]["styles.css"], "\nh1 { color: red }");
    assert_eq!(result["applied"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Queue handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_result_save_is_retried() {
    let store = Arc::new(FlakyStore::new("done", 1));
    let backend = Arc::new(ScriptedBackend::new(&[("A", Script::Reply(site_reply()))]));
    let job = enqueue(&store.inner, "p").await;

    Worker::new(store.clone(), backend.clone(), config("A"))
        .run_once()
        .await
        .unwrap();

    let job = reload(&store.inner, &job).await;
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.result.is_some());
}

#[tokio::test]
async fn unsavable_result_leaves_job_in_error() {
    let store = Arc::new(FlakyStore::new("done", usize::MAX));
    let backend = Arc::new(ScriptedBackend::new(&[("A", Script::Reply(site_reply()))]));
    let job = enqueue(&store.inner, "p").await;

    let finished = Worker::new(store.clone(), backend.clone(), config("A"))
        .process(job.clone())
        .await
        .unwrap();

    let stored = reload(&store.inner, &job).await;
    assert_eq!(stored, finished);
    assert_eq!(stored.status, JobStatus::Error);
    assert_eq!(stored.result, None);
    let error = stored.error.unwrap();
    assert!(error.starts_with("could not save done result"), "error: {error}");
}

#[tokio::test]
async fn empty_queue_reports_idle() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::default());
    assert!(!worker(&store, &backend, "A").run_once().await.unwrap());
}

#[tokio::test]
async fn popped_id_without_record_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::default());
    store
        .rpush(pagesmith_db::repositories::QUEUE_KEY, &uuid::Uuid::now_v7().to_string())
        .await
        .unwrap();

    assert!(worker(&store, &backend, "A").run_once().await.unwrap());
    assert!(backend.calls().is_empty());
    assert_eq!(JobRepo::queue_len(store.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn terminal_job_is_not_processed_again() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[("A", Script::Reply(site_reply()))]));
    let job = enqueue(&store, "p").await;
    let w = worker(&store, &backend, "A");
    w.run_once().await.unwrap();
    let done = reload(&store, &job).await;

    // Deliver the same job a second time.
    let again = w.process(done.clone()).await.unwrap();
    assert_eq!(again, done);
    assert_eq!(backend.calls().len(), 1);
    assert_eq!(reload(&store, &job).await, done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_process_each_job_once() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::new(&[("A", Script::Reply(site_reply()))]));
    let mut jobs = Vec::new();
    for i in 0..20 {
        jobs.push(enqueue(&store, &format!("job {i}")).await);
    }

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let w = worker(&store, &backend, "A");
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { w.run(cancel).await }));
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while JobRepo::queue_len(store.as_ref()).await.unwrap() > 0 || backend.calls().len() < jobs.len() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workers did not drain the queue");

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(backend.calls().len(), jobs.len());
    for job in &jobs {
        let job = reload(&store, job).await;
        assert_eq!(job.status, JobStatus::Done);
        // Exactly one start and one success per job.
        assert_eq!(job.logs.len(), 2);
    }
}

#[tokio::test]
async fn run_returns_once_cancelled() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(ScriptedBackend::default());
    let cancel = CancellationToken::new();
    let w = worker(&store, &backend, "A");

    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { w.run(cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
