use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OracleError;
use crate::output::OracleOutput;
use crate::request::OracleRequest;

/// A model endpoint that turns a request into raw JSON.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, model: &str, request: &OracleRequest) -> Result<Value, OracleError>;
}

/// Call `model` once, bounded by `timeout`, and validate the reply.
///
/// A call that outlives `timeout` is dropped and reported as
/// [`OracleError::Timeout`], the same as any other backend failure.
pub async fn call_with_timeout(
    backend: &dyn GenerationBackend,
    model: &str,
    request: &OracleRequest,
    timeout: Duration,
) -> Result<OracleOutput, OracleError> {
    let raw = tokio::time::timeout(timeout, backend.generate(model, request))
        .await
        .map_err(|_| OracleError::Timeout(timeout))??;
    let output = OracleOutput::from_value(raw)?;
    tracing::debug!(model, kind = output.kind(), "Oracle reply accepted");
    Ok(output)
}
