//! Synchronous patch endpoint. Runs the same engine the worker uses,
//! without going through the job queue or a generator.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use pagesmith_core::patch::PatchResult;

use crate::error::AppResult;
use crate::state::AppState;

/// Request body for `POST /api/v1/patch`. Fields left out fall back to the
/// server's patch settings.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatchBody {
    #[validate(length(min = 1, message = "html must not be empty"))]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub ops: Vec<Value>,
    pub root_selector: Option<String>,
    #[serde(default)]
    pub protected_selectors: Vec<String>,
    pub max_ops: Option<i64>,
}

/// POST /api/v1/patch
pub async fn apply_patch(
    State(state): State<AppState>,
    payload: Result<Json<PatchBody>, JsonRejection>,
) -> AppResult<Json<PatchResult>> {
    let Json(body) = payload?;
    body.validate()?;

    let settings = &state.config.patch;
    let mut request = settings.request(body.html, body.css, body.ops, body.root_selector);
    request.protected_selectors.extend(body.protected_selectors);
    if let Some(max_ops) = body.max_ops {
        request.max_ops = max_ops;
    }

    let result = state.engine.apply(&request)?;
    tracing::debug!(
        ops = request.ops.len(),
        changed = result.changed_count,
        "Synchronous patch applied"
    );
    Ok(Json(result))
}
