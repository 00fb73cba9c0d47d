use pagesmith_core::patch::PatchSettings;
use pagesmith_worker::config::{parse_or, ConfigError};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long in-process workers get to finish their current job after
    /// the server stops (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Number of log entries returned by the job status endpoint.
    pub status_log_tail: usize,
    /// Workers to run inside the server process. Zero leaves the queue to
    /// separate `pagesmith-worker` processes.
    pub inprocess_workers: usize,
    /// Defaults for `POST /api/v1/patch` requests that leave them out.
    pub patch: PatchSettings,
}

impl ServerConfig {
    /// Load configuration through `lookup`.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `STATUS_LOG_TAIL`       | `20`                       |
    /// | `INPROCESS_WORKERS`     | `0`                        |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "0.0.0.0".into());

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port: parse_or(&lookup, "PORT", 3000)?,
            cors_origins,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?,
            status_log_tail: parse_or(&lookup, "STATUS_LOG_TAIL", 20)?,
            inprocess_workers: parse_or(&lookup, "INPROCESS_WORKERS", 0)?,
            patch: PatchSettings::from_lookup(&lookup)?,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
