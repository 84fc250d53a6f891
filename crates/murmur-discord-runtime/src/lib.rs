//! Discord relay transport for the murmur assistant.

mod discord_helpers;
mod discord_runtime;

pub use discord_runtime::{run_discord_relay, DiscordRelayConfig, DiscordRelayRuntime};
