use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchpost_core::hours_duration;
use watchpost_relay::{SlackRelayClient, SlackRelayTarget, DEFAULT_SLACK_API_BASE};
use watchpost_runtime::{run_once, KeywordFilter, RunConfig};
use watchpost_source::{DiscordApiClient, DiscordApiConfig, DEFAULT_DISCORD_API_BASE};

#[derive(Debug, Parser)]
#[command(
    name = "watchpost",
    about = "Relays keyword matches from Discord servers to Slack and follows up on reactions and replies",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "WATCHPOST_DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for all read requests"
    )]
    discord_token: Option<String>,

    #[arg(
        long,
        env = "WATCHPOST_DISCORD_API_BASE",
        default_value = DEFAULT_DISCORD_API_BASE,
        help = "Base URL for the Discord REST API"
    )]
    discord_api_base: String,

    #[arg(
        long = "server-ids",
        env = "WATCHPOST_SERVER_IDS",
        value_delimiter = ',',
        help = "Discord server (guild) id(s) to scan"
    )]
    server_ids: Vec<String>,

    #[arg(
        long,
        env = "WATCHPOST_KEYWORDS",
        value_delimiter = ',',
        help = "Case-sensitive keyword(s) that make a message a match"
    )]
    keywords: Vec<String>,

    #[arg(
        long,
        env = "WATCHPOST_EXCLUDE_KEYWORDS",
        value_delimiter = ',',
        help = "Keyword(s) that suppress an otherwise matching message"
    )]
    exclude_keywords: Vec<String>,

    #[arg(
        long,
        env = "WATCHPOST_EXCLUDE_AUTHOR_IDS",
        value_delimiter = ',',
        help = "Author id(s) whose messages are never relayed"
    )]
    exclude_author_ids: Vec<String>,

    #[arg(
        long,
        env = "WATCHPOST_EXCLUDE_AUTHOR_NAMES",
        value_delimiter = ',',
        help = "Author name(s) excluded by case-insensitive partial match"
    )]
    exclude_author_names: Vec<String>,

    #[arg(
        long,
        env = "WATCHPOST_SLACK_WEBHOOK_URL",
        hide_env_values = true,
        help = "Slack incoming webhook URL (follow-ups cannot be threaded)"
    )]
    slack_webhook_url: Option<String>,

    #[arg(
        long,
        env = "WATCHPOST_SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token for chat.postMessage; takes precedence over the webhook"
    )]
    slack_bot_token: Option<String>,

    #[arg(
        long,
        env = "WATCHPOST_SLACK_CHANNEL_ID",
        help = "Slack channel id notifications are posted to (required with --slack-bot-token)"
    )]
    slack_channel_id: Option<String>,

    #[arg(
        long,
        env = "WATCHPOST_SLACK_API_BASE",
        default_value = DEFAULT_SLACK_API_BASE,
        help = "Base URL for the Slack Web API"
    )]
    slack_api_base: String,

    #[arg(
        long,
        env = "WATCHPOST_LOOKBACK_HOURS",
        default_value_t = 3,
        help = "Only messages sent within this many hours are scanned"
    )]
    lookback_hours: u64,

    #[arg(
        long,
        env = "WATCHPOST_RETENTION_HOURS",
        default_value_t = 72,
        help = "Tracked messages older than this many hours are pruned"
    )]
    retention_hours: u64,

    #[arg(
        long,
        env = "WATCHPOST_LEDGER_PATH",
        default_value = ".watchpost/ledger.json",
        help = "JSON file holding tracked messages between runs"
    )]
    ledger_path: PathBuf,

    #[arg(
        long,
        env = "WATCHPOST_CHANNEL_BATCH_DELAY_MS",
        default_value_t = 1_000,
        help = "Pause between channel batches of one server in milliseconds"
    )]
    channel_batch_delay_ms: u64,

    #[arg(
        long,
        env = "WATCHPOST_ENTRY_DELAY_MS",
        default_value_t = 1_000,
        help = "Pause between tracked-message checks in milliseconds"
    )]
    entry_delay_ms: u64,

    #[arg(
        long,
        env = "WATCHPOST_REQUEST_TIMEOUT_MS",
        default_value_t = 0,
        help = "HTTP timeout for Discord requests in milliseconds (0 uses the transport default)"
    )]
    request_timeout_ms: u64,

    #[arg(
        long,
        env = "WATCHPOST_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        help = "Attempts per Discord request on rate limits and server errors"
    )]
    retry_max_attempts: usize,

    #[arg(
        long,
        env = "WATCHPOST_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base exponential backoff for Discord retries in milliseconds"
    )]
    retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "WATCHPOST_DRY_RUN",
        default_value_t = false,
        help = "Scan and check tracked messages without relaying or saving the ledger"
    )]
    dry_run: bool,

    #[arg(
        long,
        env = "WATCHPOST_SUMMARY_JSON",
        default_value_t = false,
        help = "Print the run summary as JSON on stdout"
    )]
    summary_json: bool,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn resolve_discord_token(cli: &Cli) -> Result<String> {
    match non_blank(cli.discord_token.as_deref()) {
        Some(token) => Ok(token.to_string()),
        None => bail!("missing Discord token: set --discord-token or WATCHPOST_DISCORD_TOKEN"),
    }
}

fn resolve_server_ids(cli: &Cli) -> Result<Vec<String>> {
    let server_ids = cli
        .server_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if server_ids.is_empty() {
        bail!("no server ids configured: set --server-ids or WATCHPOST_SERVER_IDS");
    }
    Ok(server_ids)
}

fn resolve_relay_target(cli: &Cli) -> Result<SlackRelayTarget> {
    if let Some(bot_token) = non_blank(cli.slack_bot_token.as_deref()) {
        let Some(channel_id) = non_blank(cli.slack_channel_id.as_deref()) else {
            bail!("--slack-bot-token requires --slack-channel-id (WATCHPOST_SLACK_CHANNEL_ID)");
        };
        return Ok(SlackRelayTarget::WebApi {
            api_base: cli.slack_api_base.clone(),
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
        });
    }
    match non_blank(cli.slack_webhook_url.as_deref()) {
        Some(url) => Ok(SlackRelayTarget::IncomingWebhook {
            url: url.to_string(),
        }),
        None => bail!(
            "no notification target: set --slack-webhook-url or --slack-bot-token with --slack-channel-id"
        ),
    }
}

fn build_run_config(cli: &Cli, server_ids: Vec<String>) -> RunConfig {
    let filter = KeywordFilter::new(
        cli.keywords.clone(),
        cli.exclude_keywords.clone(),
        cli.exclude_author_ids.clone(),
        cli.exclude_author_names.clone(),
    );
    let mut config = RunConfig::new(cli.ledger_path.clone(), server_ids, filter);
    config.scan.channel_batch_delay = Duration::from_millis(cli.channel_batch_delay_ms);
    config.watch.entry_delay = Duration::from_millis(cli.entry_delay_ms);
    config.lookback_hours = cli.lookback_hours;
    config.retention = hours_duration(cli.retention_hours);
    config.dry_run = cli.dry_run;
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let token = resolve_discord_token(&cli)?;
    let server_ids = resolve_server_ids(&cli)?;
    let target = resolve_relay_target(&cli)?;
    let config = build_run_config(&cli, server_ids);
    if config.filter.keywords().is_empty() {
        info!("no keywords configured; scan will only refresh tracked messages");
    }

    let source = DiscordApiClient::new(DiscordApiConfig {
        api_base: cli.discord_api_base.clone(),
        token,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?;
    let relay = SlackRelayClient::new(target)?;

    let summary = run_once(&source, &relay, &config, Utc::now()).await;
    if cli.summary_json {
        let rendered =
            serde_json::to_string_pretty(&summary).context("failed to render run summary")?;
        println!("{rendered}");
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
