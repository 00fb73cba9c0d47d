//! Job record: one asynchronous generate-and-patch request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pagesmith_core::error::CoreError;
use pagesmith_core::types::{FileSet, JobId, Timestamp};

/// Lifecycle: `queued -> running -> {done, error}`. Terminal states never
/// transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Done) | (Self::Running, Self::Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub prompt: String,
    /// Current site files, keyed by file name (`index.html`, `styles.css`).
    #[serde(default)]
    pub files: FileSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Opaque brand hints forwarded to the generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: Timestamp,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub payload: JobPayload,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// A fresh queued job with a time-ordered id.
    pub fn new(payload: JobPayload) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::now_v7(),
            status: JobStatus::Queued,
            payload,
            logs: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry {
            at: chrono::Utc::now(),
            message: message.into(),
        });
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<(), CoreError> {
        self.transition(JobStatus::Done)?;
        self.result = Some(result);
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Error)?;
        self.error = Some(error.into());
        self.result = None;
        Ok(())
    }

    /// Caller-facing view with only the last `log_tail` log entries.
    pub fn status_view(&self, log_tail: usize) -> JobStatusView {
        let skip = self.logs.len().saturating_sub(log_tail);
        JobStatusView {
            id: self.id,
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            logs: self.logs[skip..].to_vec(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Response body for `GET /api/v1/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
