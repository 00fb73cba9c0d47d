//! Postgres-backed store tests. Need a live database:
//! `DATABASE_URL=postgres://... cargo test -p pagesmith-db -- --ignored`

use std::collections::HashSet;

use pagesmith_db::models::job::{JobPayload, JobStatus};
use pagesmith_db::repositories::JobRepo;
use pagesmith_db::{KvStore, PgStore};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn get_set_round_trip(pool: PgPool) {
    let store = PgStore::new(pool);
    assert_eq!(store.get("k").await.unwrap(), None);
    store.set("k", json!({"a": 1})).await.unwrap();
    store.set("k", json!({"a": 2})).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 2})));
    store.ping().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn list_is_fifo(pool: PgPool) {
    let store = PgStore::new(pool);
    assert_eq!(store.rpush("q", "a").await.unwrap(), 1);
    assert_eq!(store.rpush("q", "b").await.unwrap(), 2);
    assert_eq!(store.llen("q").await.unwrap(), 2);
    assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("a"));
    assert_eq!(store.lpop("q").await.unwrap().as_deref(), Some("b"));
    assert_eq!(store.lpop("q").await.unwrap(), None);
    assert_eq!(store.llen("missing").await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_pops_never_share_an_item(pool: PgPool) {
    let store = PgStore::new(pool);
    for i in 0..50 {
        store.rpush("q", &i.to_string()).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(item) = store.lpop("q").await.unwrap() {
                got.push(item);
            }
            got
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for item in handle.await.unwrap() {
            assert!(seen.insert(item), "item delivered twice");
        }
    }
    assert_eq!(seen.len(), 50);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn job_repo_on_postgres(pool: PgPool) {
    let store = PgStore::new(pool);
    let job = JobRepo::create(
        &store,
        JobPayload {
            prompt: "p".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(JobRepo::queue_len(&store).await.unwrap(), 1);
    assert_eq!(JobRepo::pop_next(&store).await.unwrap(), Some(job.id));
    let stored = JobRepo::find_by_id(&store, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
}
