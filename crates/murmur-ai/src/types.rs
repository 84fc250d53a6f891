use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Poll interval used by the run wait loop unless configured otherwise.
pub const DEFAULT_RUN_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Lifecycle states the vendor reports for an assistant run.
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    RequiresAction,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::RequiresAction => "requires_action",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }

    /// True while the vendor still reports the run as pending.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Handle for a vendor-owned conversation thread.
pub struct AssistantThread {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Handle for a message posted to a thread.
pub struct PostedMessage {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Snapshot of an assistant run and its reported status.
pub struct AssistantRun {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Text message retrieved from a conversation thread.
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
}

#[derive(Debug, Error)]
/// Enumerates failures surfaced by the assistants client.
pub enum AssistantError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("assistants API returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("assistant run {run_id} ended with status {status}")]
    RunEnded { run_id: String, status: String },
    #[error("assistant run {run_id} did not finish within {budget_ms} ms")]
    RunPollBudgetExhausted { run_id: String, budget_ms: u64 },
}

#[async_trait]
/// Trait contract for anything that can turn a user prompt into a reply.
pub trait AssistantBackend: Send + Sync {
    async fn generate_reply(&self, prompt: &str) -> Result<String, AssistantError>;
}

#[cfg(test)]
mod tests {
    use super::RunStatus;

    #[test]
    fn pending_statuses_match_poll_loop_contract() {
        assert!(RunStatus::Queued.is_pending());
        assert!(RunStatus::InProgress.is_pending());
        assert!(RunStatus::Cancelling.is_pending());
        assert!(!RunStatus::Completed.is_pending());
        assert!(!RunStatus::Failed.is_pending());
        assert!(!RunStatus::Unknown.is_pending());
    }

    #[test]
    fn unknown_statuses_deserialize_to_unknown() {
        let status: RunStatus =
            serde_json::from_str("\"some_future_state\"").expect("status must parse");
        assert_eq!(status, RunStatus::Unknown);
        let status: RunStatus = serde_json::from_str("\"in_progress\"").expect("status must parse");
        assert_eq!(status, RunStatus::InProgress);
    }
}
