use std::time::Duration;

/// Why one backend attempt failed. Every variant is recoverable at the
/// chain level: the caller logs it and moves to the next model.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Oracle API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The reply was not JSON, or not where JSON was expected.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The reply was JSON but failed the structural check.
    #[error("Invalid output: {0}")]
    InvalidOutput(String),
}
