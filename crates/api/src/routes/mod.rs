pub mod health;
pub mod jobs;
pub mod patch;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs          create (POST)
/// /jobs/{id}     status (GET)
/// /patch         synchronous patch (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .merge(patch::router())
}
