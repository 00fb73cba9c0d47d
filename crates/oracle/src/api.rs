//! HTTP client for an OpenAI-compatible chat completions endpoint.
//!
//! Sends the request as a system turn plus a JSON user turn, asks for a
//! JSON object reply, and hands back the parsed message content.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::GenerationBackend;
use crate::error::OracleError;
use crate::request::OracleRequest;

/// Characters of a failed response body kept in [`OracleError::Api`].
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// HTTP client for one chat completions deployment.
pub struct OracleApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OracleApi {
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`.
    /// * `api_key` - sent as a bearer token when present.
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    // ---- private helpers ----

    fn chat_body(model: &str, request: &OracleRequest) -> Value {
        json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system_instructions},
                {"role": "user", "content": request.user_message()},
            ],
            "response_format": {"type": "json_object"},
        })
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`OracleError::Api`] with the
    /// status and the start of the body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, OracleError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OracleError::Api {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }
        Ok(response)
    }

    /// Pull the first choice's message content out of a chat reply and
    /// parse it as JSON.
    fn extract_content(body: &str) -> Result<Value, OracleError> {
        let chat: ChatResponse = serde_json::from_str(body)
            .map_err(|e| OracleError::MalformedResponse(format!("response body is not a chat reply: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedResponse("reply has no message content".into()))?;
        serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| OracleError::MalformedResponse(format!("message content is not JSON: {e}")))
    }
}

/// Error bodies end up in job logs; keep only the first
/// [`MAX_ERROR_BODY_CHARS`] characters.
fn truncate_body(mut body: String) -> String {
    if let Some((cut, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

/// Strip one surrounding Markdown code fence, if present.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl GenerationBackend for OracleApi {
    async fn generate(&self, model: &str, request: &OracleRequest) -> Result<Value, OracleError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .json(&Self::chat_body(model, request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.trim());
        }

        let response = builder.send().await?;
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Self::extract_content(&body)
    }
}
