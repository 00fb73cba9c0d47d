//! Job records and the job queue on top of a [`KvStore`].
//!
//! The record under `job:<id>` is the single source of truth for a job.
//! The queue under [`QUEUE_KEY`] holds ids only.

use pagesmith_core::types::JobId;

use crate::models::job::{Job, JobPayload};
use crate::store::{KvStore, StoreError};

/// Well-known key of the job queue.
pub const QUEUE_KEY: &str = "jobs:queue";

pub fn job_key(id: JobId) -> String {
    format!("job:{id}")
}

pub struct JobRepo;

impl JobRepo {
    /// Write a new queued job and push its id onto the queue. Returns as
    /// soon as both writes land; processing happens elsewhere.
    pub async fn create(store: &dyn KvStore, payload: JobPayload) -> Result<Job, StoreError> {
        let job = Job::new(payload);
        // Record first, so a popped id always has a record behind it.
        Self::write(store, &job).await?;
        store.rpush(QUEUE_KEY, &job.id.to_string()).await?;
        tracing::info!(job_id = %job.id, "Job queued");
        Ok(job)
    }

    pub async fn find_by_id(store: &dyn KvStore, id: JobId) -> Result<Option<Job>, StoreError> {
        let key = job_key(id);
        let Some(value) = store.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Decode { key, source })
    }

    /// Persist `job`, stamping `updated_at`.
    pub async fn save(store: &dyn KvStore, job: &mut Job) -> Result<(), StoreError> {
        job.updated_at = chrono::Utc::now();
        Self::write(store, job).await
    }

    /// Atomically take the next id off the queue. Entries that are not
    /// valid ids are dropped with a warning.
    pub async fn pop_next(store: &dyn KvStore) -> Result<Option<JobId>, StoreError> {
        while let Some(raw) = store.lpop(QUEUE_KEY).await? {
            match raw.parse::<JobId>() {
                Ok(id) => return Ok(Some(id)),
                Err(e) => tracing::warn!(entry = %raw, error = %e, "Dropping malformed queue entry"),
            }
        }
        Ok(None)
    }

    pub async fn queue_len(store: &dyn KvStore) -> Result<usize, StoreError> {
        store.llen(QUEUE_KEY).await
    }

    // ---- private helpers ----

    async fn write(store: &dyn KvStore, job: &Job) -> Result<(), StoreError> {
        let key = job_key(job.id);
        let value = serde_json::to_value(job).map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        store.set(&key, value).await
    }
}
