use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use murmur_core::write_text_atomic;

use super::DISCORD_STATE_SCHEMA_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordRelayState {
    schema_version: u32,
    #[serde(default)]
    processed_message_keys: Vec<String>,
    #[serde(default)]
    last_message_ids: BTreeMap<String, String>,
}

impl Default for DiscordRelayState {
    fn default() -> Self {
        Self {
            schema_version: DISCORD_STATE_SCHEMA_VERSION,
            processed_message_keys: Vec::new(),
            last_message_ids: BTreeMap::new(),
        }
    }
}

pub(super) struct DiscordRelayStateStore {
    path: PathBuf,
    cap: usize,
    state: DiscordRelayState,
    processed_index: HashSet<String>,
}

impl DiscordRelayStateStore {
    pub(super) fn load(path: PathBuf, cap: usize) -> Result<Self> {
        let mut state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            serde_json::from_str::<DiscordRelayState>(&raw).with_context(|| {
                format!("failed to parse discord relay state file {}", path.display())
            })?
        } else {
            DiscordRelayState::default()
        };

        if state.schema_version != DISCORD_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported discord relay state schema: expected {}, found {}",
                DISCORD_STATE_SCHEMA_VERSION,
                state.schema_version
            );
        }

        let cap = cap.max(1);
        if state.processed_message_keys.len() > cap {
            let keep_from = state.processed_message_keys.len() - cap;
            state.processed_message_keys = state.processed_message_keys[keep_from..].to_vec();
        }

        let processed_index = state
            .processed_message_keys
            .iter()
            .cloned()
            .collect::<HashSet<_>>();
        Ok(Self {
            path,
            cap,
            state,
            processed_index,
        })
    }

    pub(super) fn contains(&self, key: &str) -> bool {
        self.processed_index.contains(key)
    }

    pub(super) fn mark_processed(&mut self, key: &str) -> bool {
        if self.processed_index.contains(key) {
            return false;
        }
        self.state.processed_message_keys.push(key.to_string());
        self.processed_index.insert(key.to_string());
        while self.state.processed_message_keys.len() > self.cap {
            let removed = self.state.processed_message_keys.remove(0);
            self.processed_index.remove(&removed);
        }
        true
    }

    pub(super) fn last_message_id(&self, channel_id: &str) -> Option<String> {
        self.state.last_message_ids.get(channel_id).cloned()
    }

    pub(super) fn record_last_message_id(&mut self, channel_id: &str, message_id: &str) {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return;
        }
        self.state
            .last_message_ids
            .insert(channel_id.to_string(), message_id.to_string());
    }

    pub(super) fn save(&self) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.state).context("failed to serialize state")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write state file {}", self.path.display()))?;
        Ok(())
    }
}
