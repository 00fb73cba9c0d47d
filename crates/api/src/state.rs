use std::sync::Arc;

use pagesmith_core::patch::PatchEngine;
use pagesmith_db::KvStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job records and the job queue.
    pub store: Arc<dyn KvStore>,
    pub config: Arc<ServerConfig>,
    /// Engine behind the synchronous patch endpoint.
    pub engine: Arc<PatchEngine>,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            engine: Arc::new(PatchEngine::default()),
        }
    }
}
