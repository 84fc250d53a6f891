//! Command-line entry point for the murmur Discord assistant relay.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use murmur_ai::{AssistantsClient, AssistantsConfig};
use murmur_discord_runtime::{run_discord_relay, DiscordRelayConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "murmur",
    about = "Discord bot that relays chat to a hosted assistant",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "DISCORD_BOT_TOKEN",
        hide_env_values = true,
        help = "Bot token used for the Discord REST API"
    )]
    discord_bot_token: String,

    #[arg(
        long,
        env = "DISCORD_APPLICATION_ID",
        help = "Application id used to register slash commands"
    )]
    discord_application_id: String,

    #[arg(
        long,
        env = "DISCORD_CHANNEL_IDS",
        value_delimiter = ',',
        required = true,
        help = "Comma-separated channel ids to poll for messages"
    )]
    discord_channel_ids: Vec<String>,

    #[arg(
        long,
        env = "DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Base URL for the Discord REST API"
    )]
    discord_api_base: String,

    #[arg(
        long,
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "API key for the hosted assistants API"
    )]
    openai_api_key: String,

    #[arg(
        long,
        env = "OPENAI_ASSISTANT_ID",
        help = "Assistant id that answers relayed prompts"
    )]
    openai_assistant_id: String,

    #[arg(
        long,
        env = "OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL for the hosted assistants API"
    )]
    openai_api_base: String,

    #[arg(
        long,
        env = "MURMUR_OWNER_ID",
        help = "Restrict slash commands to this user id when set"
    )]
    owner_user_id: Option<String>,

    #[arg(
        long,
        env = "MURMUR_STATE_DIR",
        default_value = ".murmur",
        help = "Directory for relay state files"
    )]
    state_dir: PathBuf,

    #[arg(
        long,
        env = "MURMUR_POLL_INTERVAL_MS",
        default_value_t = 2_000,
        help = "Delay between channel poll cycles in milliseconds"
    )]
    poll_interval_ms: u64,

    #[arg(
        long,
        env = "MURMUR_RUN_POLL_INTERVAL_MS",
        default_value_t = 500,
        help = "Delay between assistant run status checks in milliseconds"
    )]
    run_poll_interval_ms: u64,

    #[arg(
        long,
        env = "MURMUR_RUN_POLL_BUDGET_MS",
        default_value_t = 120_000,
        help = "Maximum time to wait for an assistant run in milliseconds"
    )]
    run_poll_budget_ms: u64,

    #[arg(
        long,
        env = "MURMUR_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        help = "Per-request HTTP timeout in milliseconds"
    )]
    request_timeout_ms: u64,

    #[arg(
        long,
        env = "MURMUR_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        help = "Maximum attempts for retryable HTTP failures"
    )]
    retry_max_attempts: usize,

    #[arg(
        long,
        env = "MURMUR_RETRY_BASE_DELAY_MS",
        default_value_t = 200,
        help = "Base delay for exponential retry backoff in milliseconds"
    )]
    retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "MURMUR_PROCESSED_EVENT_CAP",
        default_value_t = 512,
        help = "How many processed message keys to remember for deduplication"
    )]
    processed_event_cap: usize,

    #[arg(
        long,
        env = "MURMUR_HISTORY_FETCH_LIMIT",
        default_value_t = 100,
        help = "How many messages to request per channel fetch"
    )]
    history_fetch_limit: usize,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let assistants_config = AssistantsConfig {
        api_base: cli.openai_api_base.clone(),
        api_key: cli.openai_api_key.clone(),
        assistant_id: cli.openai_assistant_id.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        max_retries: cli.retry_max_attempts,
        run_poll_interval_ms: cli.run_poll_interval_ms,
        run_poll_budget_ms: cli.run_poll_budget_ms,
        ..AssistantsConfig::default()
    };
    let assistant =
        AssistantsClient::new(assistants_config).context("failed to build assistants client")?;

    let profile = assistant
        .retrieve_assistant()
        .await
        .context("failed to retrieve the configured assistant")?;
    tracing::info!(
        assistant_id = %profile.id,
        assistant_name = profile.name.as_deref().unwrap_or("unnamed"),
        "assistant resolved"
    );

    let relay_config = DiscordRelayConfig {
        assistant: Arc::new(assistant),
        api_base: cli.discord_api_base,
        bot_token: cli.discord_bot_token,
        application_id: cli.discord_application_id,
        channel_ids: cli.discord_channel_ids,
        owner_user_id: cli.owner_user_id,
        bot_user_id: None,
        state_dir: cli.state_dir,
        poll_interval: Duration::from_millis(cli.poll_interval_ms.max(1)),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        processed_event_cap: cli.processed_event_cap,
        history_fetch_limit: cli.history_fetch_limit,
    };

    run_discord_relay(relay_config).await
}
