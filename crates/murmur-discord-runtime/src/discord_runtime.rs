//! Discord relay runtime that polls channels and forwards chat to an assistant.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use murmur_ai::AssistantBackend;

use crate::discord_helpers::{compare_message_ids, is_newer_message_id, truncate_for_discord};

const DISCORD_STATE_SCHEMA_VERSION: u32 = 1;
const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[derive(Clone)]
/// Runtime configuration for the Discord relay transport loop.
pub struct DiscordRelayConfig {
    pub assistant: Arc<dyn AssistantBackend>,
    pub api_base: String,
    pub bot_token: String,
    pub application_id: String,
    pub channel_ids: Vec<String>,
    pub owner_user_id: Option<String>,
    pub bot_user_id: Option<String>,
    pub state_dir: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub processed_event_cap: usize,
    pub history_fetch_limit: usize,
}

mod discord_api_client;
mod discord_command_helpers;
mod discord_render_helpers;
mod discord_state_store;

use discord_api_client::{DiscordApiClient, DiscordMessage};
use discord_command_helpers::{
    command_registration_payload, parse_relay_command, relay_command_usage,
};
use discord_render_helpers::{
    canned_reply, render_relay_error_message, render_summary_prompt, split_private_prefix,
};
use discord_state_store::DiscordRelayStateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelMessageEvent {
    key: String,
    channel_id: String,
    message_id: String,
    author_id: String,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RelayCommand {
    Ping,
    UserId { target: Option<String> },
    SummarizeText { text: String },
    SummarizeLast { count: usize, user: Option<String> },
    SummarizeLink { url: String },
    Invalid { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyRoute {
    Channel,
    DirectMessage,
}

#[derive(Debug, Default)]
pub(crate) struct PollCycleReport {
    pub discovered_messages: usize,
    pub replied_messages: usize,
    pub skipped_duplicate_messages: usize,
    pub skipped_bot_messages: usize,
    pub failed_messages: usize,
}

impl PollCycleReport {
    fn has_activity(&self) -> bool {
        self.discovered_messages > 0
            || self.replied_messages > 0
            || self.skipped_duplicate_messages > 0
            || self.skipped_bot_messages > 0
            || self.failed_messages > 0
    }
}

/// Runs the Discord relay transport loop until a shutdown signal arrives.
pub async fn run_discord_relay(config: DiscordRelayConfig) -> Result<()> {
    let mut runtime = DiscordRelayRuntime::new(config).await?;
    runtime.run().await
}

pub struct DiscordRelayRuntime {
    config: DiscordRelayConfig,
    discord_client: DiscordApiClient,
    state_store: DiscordRelayStateStore,
    bot_user_id: String,
}

impl DiscordRelayRuntime {
    pub async fn new(config: DiscordRelayConfig) -> Result<Self> {
        let state_dir = config.state_dir.clone();
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("failed to create {}", state_dir.display()))?;

        let discord_client = DiscordApiClient::new(
            config.api_base.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;

        let bot_user_id = match config.bot_user_id.clone() {
            Some(user_id) if !user_id.trim().is_empty() => user_id.trim().to_string(),
            _ => discord_client.resolve_bot_user().await?.id,
        };

        let state_store = DiscordRelayStateStore::load(
            state_dir.join("state.json"),
            config.processed_event_cap,
        )?;

        Ok(Self {
            config,
            discord_client,
            state_store,
            bot_user_id,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Polls until `shutdown` resolves. The future is installed once and
    /// polled across cycles, so a signal that lands mid-cycle still stops
    /// the loop at the next select point.
    async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = std::io::Result<()>>,
    {
        match self.sync_commands().await {
            Ok(count) => tracing::info!(count, "synced application commands"),
            Err(error) => tracing::warn!(error = %error, "failed to sync application commands"),
        }
        tracing::info!(bot_user_id = %self.bot_user_id, "discord relay is now running");

        tokio::pin!(shutdown);
        loop {
            let cycle_started = Instant::now();
            match self.run_poll_cycle().await {
                Ok(report) => {
                    if report.has_activity() {
                        tracing::info!(
                            discovered = report.discovered_messages,
                            replied = report.replied_messages,
                            duplicates = report.skipped_duplicate_messages,
                            bots = report.skipped_bot_messages,
                            failed = report.failed_messages,
                            cycle_ms = cycle_started.elapsed().as_millis() as u64,
                            "discord poll cycle complete"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "discord poll cycle failed");
                }
            }
            self.state_store.save()?;

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("discord relay shutdown requested");
                    self.state_store.save()?;
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Registers the relay's slash commands and returns how many were synced.
    async fn sync_commands(&self) -> Result<usize> {
        self.discord_client
            .register_commands(
                self.config.application_id.as_str(),
                &command_registration_payload(),
            )
            .await
    }

    pub(crate) async fn run_poll_cycle(&mut self) -> Result<PollCycleReport> {
        let mut report = PollCycleReport::default();
        let channel_ids = self.config.channel_ids.clone();
        for channel_id in &channel_ids {
            let channel_id = channel_id.trim();
            if channel_id.is_empty() {
                continue;
            }
            self.poll_channel(channel_id, &mut report).await?;
        }
        Ok(report)
    }

    async fn poll_channel(&mut self, channel_id: &str, report: &mut PollCycleReport) -> Result<()> {
        let mut messages = self
            .discord_client
            .fetch_channel_messages(channel_id, self.config.history_fetch_limit)
            .await?;
        messages.sort_by(|left, right| compare_message_ids(&left.id, &right.id));

        let previous_id = self.state_store.last_message_id(channel_id);
        let Some(previous_id) = previous_id else {
            // First poll of a channel only records the high-water mark so the
            // relay does not replay the existing backlog.
            if let Some(newest) = messages.last() {
                self.state_store
                    .record_last_message_id(channel_id, newest.id.as_str());
            }
            return Ok(());
        };

        let mut latest_seen = previous_id.clone();
        for message in &messages {
            if !is_newer_message_id(message.id.as_str(), Some(previous_id.as_str())) {
                continue;
            }
            if is_newer_message_id(message.id.as_str(), Some(latest_seen.as_str())) {
                latest_seen = message.id.trim().to_string();
            }
            report.discovered_messages += 1;

            if message.author.bot || message.author.id == self.bot_user_id {
                report.skipped_bot_messages += 1;
                continue;
            }

            let event = channel_message_event(channel_id, message);
            if self.state_store.contains(event.key.as_str()) {
                report.skipped_duplicate_messages += 1;
                continue;
            }
            self.state_store.mark_processed(event.key.as_str());

            match self.handle_event(&event).await {
                Ok(()) => report.replied_messages += 1,
                Err(error) => {
                    report.failed_messages += 1;
                    tracing::warn!(
                        channel_id = %event.channel_id,
                        message_id = %event.message_id,
                        error = %error,
                        "failed to handle channel message"
                    );
                    let notice = render_relay_error_message(&error);
                    if let Err(post_error) = self
                        .post_reply(ReplyRoute::Channel, &event, notice.as_str())
                        .await
                    {
                        tracing::warn!(
                            channel_id = %event.channel_id,
                            error = %post_error,
                            "failed to post error notice"
                        );
                    }
                }
            }
        }

        self.state_store
            .record_last_message_id(channel_id, latest_seen.as_str());
        Ok(())
    }

    async fn handle_event(&self, event: &ChannelMessageEvent) -> Result<()> {
        match parse_relay_command(event.text.as_str()) {
            Some(command) => self.handle_command(event, command).await,
            None => self.handle_chat(event).await,
        }
    }

    async fn handle_chat(&self, event: &ChannelMessageEvent) -> Result<()> {
        let (route, prompt) = split_private_prefix(event.text.as_str());

        if let Some(reply) = canned_reply(prompt) {
            return self.post_reply(route, event, reply.as_str()).await;
        }

        let reply = self
            .config
            .assistant
            .generate_reply(prompt.trim())
            .await
            .context("assistant request failed")?;
        self.post_reply(route, event, reply.as_str()).await
    }

    async fn handle_command(
        &self,
        event: &ChannelMessageEvent,
        command: RelayCommand,
    ) -> Result<()> {
        if let Some(owner_id) = self
            .config
            .owner_user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            if event.author_id != owner_id {
                return self
                    .post_reply(
                        ReplyRoute::Channel,
                        event,
                        "You are not authorized to use relay commands.",
                    )
                    .await;
            }
        }

        match command {
            RelayCommand::Ping => {
                let reply = format!("<@{}> pong", event.author_id);
                self.post_reply(ReplyRoute::DirectMessage, event, reply.as_str())
                    .await
            }
            RelayCommand::UserId { target } => {
                let target_id = target.unwrap_or_else(|| event.author_id.clone());
                let target_name = self.resolve_user_name(target_id.as_str()).await;
                let reply = format!("ID for {target_name}: {target_id}");
                self.post_reply(ReplyRoute::Channel, event, reply.as_str())
                    .await
            }
            RelayCommand::SummarizeText { text } => {
                let (route, text) = split_private_prefix(text.as_str());
                let prompt = render_summary_prompt(&[text.to_string()]);
                let reply = self
                    .config
                    .assistant
                    .generate_reply(prompt.as_str())
                    .await
                    .context("assistant request failed")?;
                self.post_reply(route, event, reply.as_str()).await
            }
            RelayCommand::SummarizeLast { count, user } => {
                self.handle_summarize_last(event, count, user.as_deref())
                    .await
            }
            RelayCommand::SummarizeLink { url } => {
                let reply =
                    format!("Summarizing the link {url} is not implemented yet.");
                self.post_reply(ReplyRoute::DirectMessage, event, reply.as_str())
                    .await
            }
            RelayCommand::Invalid { message } => {
                self.post_reply(ReplyRoute::Channel, event, message.as_str())
                    .await
            }
        }
    }

    async fn handle_summarize_last(
        &self,
        event: &ChannelMessageEvent,
        count: usize,
        user: Option<&str>,
    ) -> Result<()> {
        if count == 0 {
            return self
                .post_reply(ReplyRoute::Channel, event, relay_command_usage().as_str())
                .await;
        }

        let user_name = match user {
            Some(user_id) => Some(self.resolve_user_name(user_id).await),
            None => None,
        };

        let mut history = self
            .discord_client
            .fetch_channel_messages(event.channel_id.as_str(), self.config.history_fetch_limit)
            .await?;
        history.sort_by(|left, right| compare_message_ids(&left.id, &right.id));

        let selected: Vec<String> = history
            .iter()
            .filter(|message| message.id != event.message_id && !message.author.bot)
            .filter(|message| message.author.id != self.bot_user_id)
            .filter(|message| user.map_or(true, |user_id| message.author.id == user_id))
            .filter(|message| !message.content.trim().is_empty())
            .map(|message| message.content.trim().to_string())
            .collect();
        let selected: Vec<String> = selected
            .into_iter()
            .rev()
            .take(count)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        if selected.is_empty() {
            let reply = match user_name.as_deref() {
                Some(name) => format!("No messages found from {name}."),
                None => "No messages found to summarize.".to_string(),
            };
            return self
                .post_reply(ReplyRoute::DirectMessage, event, reply.as_str())
                .await;
        }

        let ack = match user_name.as_deref() {
            Some(name) => format!(
                "Summarizing the last {} messages from {name}.",
                selected.len()
            ),
            None => format!("Summarizing the last {} messages.", selected.len()),
        };
        self.post_reply(ReplyRoute::DirectMessage, event, ack.as_str())
            .await?;

        let prompt = render_summary_prompt(&selected);
        let reply = self
            .config
            .assistant
            .generate_reply(prompt.as_str())
            .await
            .context("assistant request failed")?;
        self.post_reply(ReplyRoute::Channel, event, reply.as_str())
            .await
    }

    /// Resolves a user's display name, falling back to the raw id when the
    /// lookup fails so the reply still goes out.
    async fn resolve_user_name(&self, user_id: &str) -> String {
        match self.discord_client.fetch_user(user_id).await {
            Ok(user) => user.display_name().to_string(),
            Err(error) => {
                tracing::warn!(user_id = %user_id, error = %error, "failed to look up user name");
                user_id.to_string()
            }
        }
    }

    async fn post_reply(
        &self,
        route: ReplyRoute,
        event: &ChannelMessageEvent,
        text: &str,
    ) -> Result<()> {
        let content = truncate_for_discord(text, DISCORD_MESSAGE_LIMIT);
        match route {
            ReplyRoute::Channel => {
                self.discord_client
                    .post_channel_message(event.channel_id.as_str(), content.as_str())
                    .await?;
            }
            ReplyRoute::DirectMessage => {
                self.discord_client
                    .post_direct_message(event.author_id.as_str(), content.as_str())
                    .await?;
            }
        }
        Ok(())
    }
}

fn channel_message_event(channel_id: &str, message: &DiscordMessage) -> ChannelMessageEvent {
    ChannelMessageEvent {
        key: format!("discord:{}:{}", channel_id, message.id.trim()),
        channel_id: channel_id.to_string(),
        message_id: message.id.trim().to_string(),
        author_id: message.author.id.clone(),
        text: message.content.clone(),
    }
}
