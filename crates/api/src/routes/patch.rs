use axum::routing::post;
use axum::Router;

use crate::handlers::patch;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/patch", post(patch::apply_patch))
}
