//! Queue consumer and per-job fallback driver.
//!
//! Pops job ids off the shared queue and processes each job to a terminal
//! state. Any number of workers may share one store: the pop is atomic,
//! so an id is delivered to exactly one of them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pagesmith_core::error::CoreError;
use pagesmith_core::patch::PatchEngine;
use pagesmith_db::models::job::{Job, JobStatus};
use pagesmith_db::repositories::JobRepo;
use pagesmith_db::{KvStore, StoreError};
use pagesmith_oracle::{call_with_timeout, GenerationBackend, OracleError, OracleRequest};
use pagesmith_pipeline::{GeneratedSite, Pipeline, PipelineError};

use crate::config::WorkerConfig;

/// Attempts at writing a job's terminal state before giving up on it.
const TERMINAL_SAVE_ATTEMPTS: u32 = 3;
/// Base delay between terminal save attempts, multiplied by the attempt.
const TERMINAL_SAVE_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] CoreError),

    #[error("Could not encode job result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why one model attempt failed.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Stored as the job result on success.
#[derive(Serialize)]
struct JobResult<'a> {
    model: &'a str,
    #[serde(flatten)]
    site: &'a GeneratedSite,
}

pub struct Worker {
    store: Arc<dyn KvStore>,
    backend: Arc<dyn GenerationBackend>,
    pipeline: Pipeline,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(store: Arc<dyn KvStore>, backend: Arc<dyn GenerationBackend>, config: WorkerConfig) -> Self {
        let pipeline = Pipeline::new(PatchEngine::default(), config.patch.clone());
        Self {
            store,
            backend,
            pipeline,
            config,
        }
    }

    /// Process jobs until `cancel` fires. Cancellation is observed between
    /// jobs only; a job already running finishes first.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            models = %self.config.model_chain,
            idle_backoff_ms = self.config.idle_backoff.as_millis() as u64,
            "Worker started",
        );

        while !cancel.is_cancelled() {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Worker cycle failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.idle_backoff) => {}
            }
        }

        tracing::info!("Worker shutting down");
    }

    /// Pop and process at most one job. Returns `false` when the queue
    /// was empty.
    pub async fn run_once(&self) -> Result<bool, WorkerError> {
        let Some(id) = JobRepo::pop_next(self.store.as_ref()).await? else {
            return Ok(false);
        };
        match JobRepo::find_by_id(self.store.as_ref(), id).await? {
            Some(job) => {
                self.process(job).await?;
            }
            None => tracing::debug!(job_id = %id, "Popped job has no record, skipping"),
        }
        Ok(true)
    }

    /// Drive `job` to `done` or `error`, trying each model of the chain in
    /// order until one produces usable output.
    pub async fn process(&self, mut job: Job) -> Result<Job, WorkerError> {
        if job.status != JobStatus::Queued {
            tracing::warn!(job_id = %job.id, status = %job.status, "Job is not queued, skipping");
            return Ok(job);
        }

        job.transition(JobStatus::Running)?;
        job.log(format!("Started, model chain: {}", self.config.model_chain));
        JobRepo::save(self.store.as_ref(), &mut job).await?;

        let request = OracleRequest {
            system_instructions: self.config.system_instructions.clone(),
            prompt: job.payload.prompt.clone(),
            current_files: job.payload.files.clone(),
            brand: job.payload.brand.clone(),
            preset: job.payload.preset.clone(),
        };

        let mut last_failure = None;
        for model in self.config.model_chain.iter() {
            match self.attempt(model, &request).await {
                Ok(site) => {
                    job.log(format!(
                        "{model} succeeded ({} output, {} changes)",
                        site.mode.as_str(),
                        site.changed
                    ));
                    let running = job.clone();
                    job.complete(serde_json::to_value(JobResult { model, site: &site })?)?;
                    self.save_terminal(&mut job, running).await?;
                    if job.status == JobStatus::Done {
                        tracing::info!(job_id = %job.id, model, changed = site.changed, "Job done");
                    }
                    return Ok(job);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, model, error = %e, "Model attempt failed");
                    job.log(format!("{model} failed: {e}"));
                    JobRepo::save(self.store.as_ref(), &mut job).await?;
                    last_failure = Some(format!("{model}: {e}"));
                }
            }
        }

        let error = last_failure.unwrap_or_else(|| "model chain is empty".into());
        tracing::warn!(job_id = %job.id, error = %error, "Model chain exhausted");
        let running = job.clone();
        job.fail(error)?;
        self.save_terminal(&mut job, running).await?;
        Ok(job)
    }

    // ---- private helpers ----

    /// Write `job`'s terminal state, retrying with a short backoff. When the
    /// store keeps refusing, `running` (the job before it finished) is
    /// failed with the save error and written once more, and `job` is
    /// replaced by it on success.
    async fn save_terminal(&self, job: &mut Job, mut running: Job) -> Result<(), WorkerError> {
        let mut attempt = 1;
        let err = loop {
            match JobRepo::save(self.store.as_ref(), job).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < TERMINAL_SAVE_ATTEMPTS => {
                    tracing::warn!(job_id = %job.id, attempt, error = %e, "Saving finished job failed, retrying");
                    tokio::time::sleep(TERMINAL_SAVE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        tracing::error!(job_id = %job.id, status = %job.status, error = %err, "Could not save finished job");
        let reason = format!("could not save {} result: {err}", job.status);
        running.log(reason.clone());
        running.fail(reason)?;
        JobRepo::save(self.store.as_ref(), &mut running).await?;
        *job = running;
        Ok(())
    }

    async fn attempt(&self, model: &str, request: &OracleRequest) -> Result<GeneratedSite, AttemptError> {
        let output = call_with_timeout(self.backend.as_ref(), model, request, self.config.oracle_timeout).await?;
        Ok(self.pipeline.apply_output(&request.current_files, output)?)
    }
}
