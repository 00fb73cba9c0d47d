//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use pagesmith_db::models::job::{Job, JobPayload};
use pagesmith_db::repositories::JobRepo;
use pagesmith_db::{KvStore, MemoryStore, StoreError};
use pagesmith_oracle::{GenerationBackend, OracleError, OracleRequest};
use pagesmith_worker::{Worker, WorkerConfig};

/// What a scripted model does when called.
#[derive(Clone)]
pub enum Script {
    Reply(Value),
    Fail(u16),
    Hang,
}

/// In-process backend whose replies are fixed per model name.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(model, script)| (model.to_string(), script.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, model: &str, _request: &OracleRequest) -> Result<Value, OracleError> {
        self.calls.lock().unwrap().push(model.to_string());
        match self.scripts.get(model) {
            Some(Script::Reply(value)) => Ok(value.clone()),
            Some(Script::Fail(status)) => Err(OracleError::Api {
                status: *status,
                body: "scripted failure".into(),
            }),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(OracleError::MalformedResponse("unreachable".into()))
            }
            None => Err(OracleError::Api {
                status: 404,
                body: format!("unknown model {model}"),
            }),
        }
    }
}

/// Memory store that refuses to write a job in the given status a fixed
/// number of times before behaving normally.
pub struct FlakyStore {
    pub inner: MemoryStore,
    status: &'static str,
    failures_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new(status: &'static str, failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            status,
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if value["status"] == self.status
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::NotAList { key: key.to_string() });
        }
        self.inner.set(key, value).await
    }

    async fn rpush(&self, key: &str, item: &str) -> Result<usize, StoreError> {
        self.inner.rpush(key, item).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.lpop(key).await
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        self.inner.llen(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

pub fn site_reply() -> Value {
    json!({"index.html": "<body><h1>Generated</h1></body>", "styles.css": "h1 { color: blue }"})
}

pub fn config(chain: &str) -> WorkerConfig {
    let chain = chain.to_string();
    WorkerConfig::from_lookup(move |key| match key {
        "MODEL_CHAIN" => Some(chain.clone()),
        "ORACLE_TIMEOUT_SECS" => Some("1".into()),
        "WORKER_IDLE_BACKOFF_MS" => Some("5".into()),
        _ => None,
    })
    .unwrap()
}

pub fn worker(store: &Arc<MemoryStore>, backend: &Arc<ScriptedBackend>, chain: &str) -> Worker {
    Worker::new(store.clone(), backend.clone(), config(chain))
}

pub fn payload(prompt: &str) -> JobPayload {
    JobPayload {
        prompt: prompt.into(),
        files: [(
            "index.html".to_string(),
            "<body><nav>n</nav><h1>Old</h1></body>".to_string(),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    }
}

pub async fn enqueue(store: &MemoryStore, prompt: &str) -> Job {
    JobRepo::create(store, payload(prompt)).await.unwrap()
}

pub async fn reload(store: &MemoryStore, job: &Job) -> Job {
    JobRepo::find_by_id(store, job.id).await.unwrap().unwrap()
}

pub fn log_messages(job: &Job) -> Vec<String> {
    job.logs.iter().map(|l| l.message.clone()).collect()
}
