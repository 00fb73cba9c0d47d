//! Handlers for the `/jobs` resource.
//!
//! Creating a job only records it and queues its id; a worker picks it
//! up later. Callers poll the status endpoint for the outcome.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use pagesmith_core::error::CoreError;
use pagesmith_core::types::{FileSet, JobId};
use pagesmith_db::models::job::{JobPayload, JobStatus};
use pagesmith_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateJob {
    #[validate(length(min = 1, max = 20000, message = "prompt must be 1-20000 characters"))]
    pub prompt: String,
    #[serde(default)]
    pub files: FileSet,
    #[validate(length(max = 100))]
    pub preset: Option<String>,
    pub brand: Option<Value>,
}

impl From<CreateJob> for JobPayload {
    fn from(input: CreateJob) -> Self {
        Self {
            prompt: input.prompt,
            files: input.files,
            preset: input.preset,
            brand: input.brand,
        }
    }
}

/// Body of a successful create.
#[derive(Debug, Serialize)]
pub struct CreatedJob {
    pub id: JobId,
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Queue a new job. Returns 201 with its id as soon as it is queued.
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJob>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    input.validate()?;

    let job = JobRepo::create(state.store.as_ref(), input.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedJob {
                id: job.id,
                status: job.status,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Current status, result or error, and the tail of the job log.
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: id.clone(),
        })
    };
    // Malformed ids are reported as unknown.
    let job_id: JobId = id.parse().map_err(|_| not_found())?;
    let job = JobRepo::find_by_id(state.store.as_ref(), job_id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(DataResponse {
        data: job.status_view(state.config.status_log_tail),
    }))
}
