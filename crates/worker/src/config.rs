use std::str::FromStr;
use std::time::Duration;

use pagesmith_core::error::CoreError;
use pagesmith_core::patch::PatchSettings;
use pagesmith_oracle::{ModelChain, DEFAULT_SYSTEM_INSTRUCTIONS};

pub const DEFAULT_ORACLE_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("MODEL_CHAIN must name at least one model")]
    EmptyChain,

    #[error(transparent)]
    Patch(#[from] CoreError),
}

/// Read `var` through `lookup` and parse it, falling back to `default`
/// when unset.
pub fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub model_chain: ModelChain,
    pub oracle_base_url: String,
    pub oracle_api_key: Option<String>,
    /// Bound on a single backend call.
    pub oracle_timeout: Duration,
    /// Sleep between polls of an empty queue.
    pub idle_backoff: Duration,
    pub system_instructions: String,
    pub patch: PatchSettings,
}

impl WorkerConfig {
    /// Load configuration through `lookup`.
    ///
    /// | Env Var                  | Default                       |
    /// |--------------------------|-------------------------------|
    /// | `MODEL_CHAIN`            | required, comma-separated     |
    /// | `ORACLE_BASE_URL`        | `https://api.openai.com/v1`   |
    /// | `ORACLE_API_KEY`         | unset                         |
    /// | `ORACLE_TIMEOUT_SECS`    | `60`                          |
    /// | `WORKER_IDLE_BACKOFF_MS` | `1000`                        |
    /// | `SYSTEM_INSTRUCTIONS`    | built-in prompt               |
    ///
    /// Patch settings (`PATCH_MAX_OPS`, `PATCH_ROOT_SELECTOR`,
    /// `PROTECTED_SELECTORS`) are read through the same lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let chain = lookup("MODEL_CHAIN").ok_or(ConfigError::Missing("MODEL_CHAIN"))?;
        let model_chain = ModelChain::parse(&chain).map_err(|_| ConfigError::EmptyChain)?;

        let oracle_base_url = lookup("ORACLE_BASE_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ORACLE_BASE_URL.into());
        let oracle_api_key = lookup("ORACLE_API_KEY").filter(|s| !s.trim().is_empty());

        let timeout_secs: u64 = parse_or(&lookup, "ORACLE_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "ORACLE_TIMEOUT_SECS",
                value: "0".into(),
            });
        }
        let backoff_ms: u64 = parse_or(&lookup, "WORKER_IDLE_BACKOFF_MS", 1000)?;

        let system_instructions = lookup("SYSTEM_INSTRUCTIONS")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTIONS.into());

        let patch = PatchSettings::from_lookup(&lookup)?;

        Ok(Self {
            model_chain,
            oracle_base_url,
            oracle_api_key,
            oracle_timeout: Duration::from_secs(timeout_secs),
            idle_backoff: Duration::from_millis(backoff_ms),
            system_instructions,
            patch,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
