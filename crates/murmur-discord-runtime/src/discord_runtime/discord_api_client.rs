//! Discord REST client helpers used by relay polling and posting flows.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::discord_helpers::{
    is_retryable_discord_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

#[derive(Debug, Clone, Deserialize)]
pub(super) struct DiscordUser {
    pub(super) id: String,
    #[serde(default)]
    pub(super) username: Option<String>,
    #[serde(default)]
    pub(super) bot: bool,
}

impl DiscordUser {
    pub(super) fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct DiscordMessage {
    pub(super) id: String,
    #[serde(default)]
    pub(super) content: String,
    pub(super) author: DiscordUser,
}

#[derive(Debug, Clone, Deserialize)]
struct DmChannelResponse {
    id: String,
}

#[derive(Clone)]
pub(super) struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    auth_header: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub(super) fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let bot_token = bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("discord bot token cannot be empty");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("murmur-discord-relay"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth_header: format!("Bot {bot_token}"),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    pub(super) async fn resolve_bot_user(&self) -> Result<DiscordUser> {
        self.request_json("users/@me", || {
            self.http
                .get(format!("{}/users/@me", self.api_base))
                .header("authorization", self.auth_header.as_str())
        })
        .await
    }

    pub(super) async fn fetch_user(&self, user_id: &str) -> Result<DiscordUser> {
        self.request_json("user lookup", || {
            self.http
                .get(format!("{}/users/{}", self.api_base, user_id))
                .header("authorization", self.auth_header.as_str())
        })
        .await
    }

    pub(super) async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>> {
        self.request_json("channel messages", || {
            self.http
                .get(format!(
                    "{}/channels/{}/messages",
                    self.api_base, channel_id
                ))
                .query(&[("limit", limit.to_string())])
                .header("authorization", self.auth_header.as_str())
        })
        .await
    }

    pub(super) async fn post_channel_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<DiscordMessage> {
        let payload = json!({ "content": content });
        self.request_json("message create", || {
            self.http
                .post(format!(
                    "{}/channels/{}/messages",
                    self.api_base, channel_id
                ))
                .header("authorization", self.auth_header.as_str())
                .json(&payload)
        })
        .await
    }

    /// Opens (or reuses) the DM channel for a user and posts into it.
    pub(super) async fn post_direct_message(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<DiscordMessage> {
        let payload = json!({ "recipient_id": user_id });
        let dm_channel: DmChannelResponse = self
            .request_json("dm channel create", || {
                self.http
                    .post(format!("{}/users/@me/channels", self.api_base))
                    .header("authorization", self.auth_header.as_str())
                    .json(&payload)
            })
            .await?;
        self.post_channel_message(dm_channel.id.as_str(), content)
            .await
    }

    /// Overwrites the global application command set and returns its size.
    pub(super) async fn register_commands(
        &self,
        application_id: &str,
        commands: &Value,
    ) -> Result<usize> {
        let registered: Vec<Value> = self
            .request_json("command registration", || {
                self.http
                    .put(format!(
                        "{}/applications/{}/commands",
                        self.api_base, application_id
                    ))
                    .header("authorization", self.auth_header.as_str())
                    .json(commands)
            })
            .await?;
        Ok(registered.len())
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header("x-murmur-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode discord {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_discord_status(status.as_u16())
                    {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "discord api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("discord api {operation} request failed"));
                }
            }
        }
    }
}
