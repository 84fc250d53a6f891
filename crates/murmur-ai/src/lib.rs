//! Client for the hosted assistants API used by murmur transports.
mod assistants;
mod types;

pub use assistants::{AssistantProfile, AssistantsClient, AssistantsConfig};
pub use types::{
    AssistantBackend, AssistantError, AssistantRun, AssistantThread, MessageRole, PostedMessage,
    RunStatus, ThreadMessage, DEFAULT_RUN_POLL_INTERVAL_MS,
};
