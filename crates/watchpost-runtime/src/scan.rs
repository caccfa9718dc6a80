//! Scan orchestration: servers -> text channels -> recent messages.
//!
//! Channels of one server are fetched in concurrent batches with a pause
//! between batches; servers are scanned in concurrent batches without a
//! pause. Every unit reports a tagged outcome so one failing channel or
//! server never aborts its siblings.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use watchpost_source::{message_url, MessageSource, SourceChannel, SourceMessage, SourceServer};

use crate::filter::{evaluate, FilterDecision, MessageFilter};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_CHANNEL_BATCH_SIZE: usize = 5;
pub const DEFAULT_SERVER_BATCH_SIZE: usize = 3;
pub const DEFAULT_CHANNEL_BATCH_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub server_ids: Vec<String>,
    /// Single page fetched per channel; older history is not revisited.
    pub page_size: usize,
    pub channel_batch_size: usize,
    pub server_batch_size: usize,
    pub channel_batch_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            server_ids: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            channel_batch_size: DEFAULT_CHANNEL_BATCH_SIZE,
            server_batch_size: DEFAULT_SERVER_BATCH_SIZE,
            channel_batch_delay: Duration::from_millis(DEFAULT_CHANNEL_BATCH_DELAY_MS),
        }
    }
}

/// A message that passed the filter during this run. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub server_id: String,
    pub server_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub message_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub message_url: String,
    /// Decoded from the message id.
    pub sent_at: DateTime<Utc>,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelScanOutcome {
    Scanned {
        messages_examined: usize,
        excluded: usize,
        matches: Vec<MatchCandidate>,
    },
    /// Access was denied; counted as skipped, not as an error.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScanResult {
    pub channel_id: String,
    pub channel_name: String,
    pub outcome: ChannelScanOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerScanOutcome {
    Scanned { channels: Vec<ChannelScanResult> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerScanResult {
    pub server_id: String,
    pub server_name: Option<String>,
    pub outcome: ServerScanOutcome,
}

impl ServerScanResult {
    fn channels(&self) -> &[ChannelScanResult] {
        match &self.outcome {
            ServerScanOutcome::Scanned { channels } => channels,
            ServerScanOutcome::Failed { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub servers: Vec<ServerScanResult>,
}

impl ScanReport {
    pub fn servers_scanned(&self) -> usize {
        self.servers
            .iter()
            .filter(|server| matches!(server.outcome, ServerScanOutcome::Scanned { .. }))
            .count()
    }

    pub fn server_errors(&self) -> usize {
        self.servers.len() - self.servers_scanned()
    }

    fn channel_results(&self) -> impl Iterator<Item = &ChannelScanResult> {
        self.servers.iter().flat_map(|server| server.channels().iter())
    }

    pub fn channels_scanned(&self) -> usize {
        self.channel_results()
            .filter(|channel| matches!(channel.outcome, ChannelScanOutcome::Scanned { .. }))
            .count()
    }

    pub fn channels_skipped(&self) -> usize {
        self.channel_results()
            .filter(|channel| matches!(channel.outcome, ChannelScanOutcome::Skipped { .. }))
            .count()
    }

    pub fn messages_examined(&self) -> usize {
        self.channel_results()
            .map(|channel| match &channel.outcome {
                ChannelScanOutcome::Scanned {
                    messages_examined, ..
                } => *messages_examined,
                _ => 0,
            })
            .sum()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &MatchCandidate> {
        self.channel_results()
            .filter_map(|channel| match &channel.outcome {
                ChannelScanOutcome::Scanned { matches, .. } => Some(matches.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Flat list of server-level and channel-level failures.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for server in &self.servers {
            match &server.outcome {
                ServerScanOutcome::Failed { error } => {
                    errors.push(format!("server {}: {error}", server.server_id));
                }
                ServerScanOutcome::Scanned { channels } => {
                    for channel in channels {
                        if let ChannelScanOutcome::Failed { error } = &channel.outcome {
                            errors.push(format!(
                                "server {} channel {} (#{}): {error}",
                                server.server_id, channel.channel_id, channel.channel_name
                            ));
                        }
                    }
                }
            }
        }
        errors
    }
}

/// Runs `task` over `items` in batches of `batch_size`, awaiting each batch
/// fully before sleeping `pause` and starting the next one.
pub(crate) async fn run_in_batches<'a, T, R, F, Fut>(
    items: &'a [T],
    batch_size: usize,
    pause: Duration,
    mut task: F,
) -> Vec<R>
where
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = R>,
{
    let batch_size = batch_size.max(1);
    let batch_count = items.len().div_ceil(batch_size);
    let mut results = Vec::with_capacity(items.len());
    for (index, batch) in items.chunks(batch_size).enumerate() {
        results.extend(join_all(batch.iter().map(&mut task)).await);
        if !pause.is_zero() && index + 1 < batch_count {
            tokio::time::sleep(pause).await;
        }
    }
    results
}

fn dedup_server_ids(server_ids: &[String]) -> Vec<String> {
    let mut unique = Vec::with_capacity(server_ids.len());
    for id in server_ids {
        let id = id.trim();
        if !id.is_empty() && !unique.iter().any(|known: &String| known == id) {
            unique.push(id.to_string());
        }
    }
    unique
}

/// Scans every configured server for messages sent at or after `cutoff`.
pub async fn scan_servers(
    source: &dyn MessageSource,
    filter: &dyn MessageFilter,
    config: &ScanConfig,
    cutoff: DateTime<Utc>,
) -> ScanReport {
    let server_ids = dedup_server_ids(&config.server_ids);
    info!(
        servers = server_ids.len(),
        cutoff = %cutoff.to_rfc3339(),
        "starting keyword scan"
    );
    let servers = run_in_batches(
        &server_ids,
        config.server_batch_size,
        Duration::ZERO,
        |server_id| scan_server(source, filter, config, server_id, cutoff),
    )
    .await;
    ScanReport { servers }
}

async fn scan_server(
    source: &dyn MessageSource,
    filter: &dyn MessageFilter,
    config: &ScanConfig,
    server_id: &str,
    cutoff: DateTime<Utc>,
) -> ServerScanResult {
    let server = match source.fetch_server(server_id).await {
        Ok(server) => server,
        Err(error) => {
            warn!(server_id, %error, "failed to fetch server, skipping its channels");
            return ServerScanResult {
                server_id: server_id.to_string(),
                server_name: None,
                outcome: ServerScanOutcome::Failed {
                    error: error.to_string(),
                },
            };
        }
    };
    let channels = match source.fetch_channels(server_id).await {
        Ok(channels) => channels,
        Err(error) => {
            warn!(server_id, %error, "failed to list server channels");
            return ServerScanResult {
                server_id: server_id.to_string(),
                server_name: Some(server.name),
                outcome: ServerScanOutcome::Failed {
                    error: error.to_string(),
                },
            };
        }
    };

    let text_channels = channels
        .into_iter()
        .filter(SourceChannel::is_text)
        .collect::<Vec<_>>();
    debug!(
        server_id,
        server = %server.name,
        channels = text_channels.len(),
        "scanning text channels"
    );
    let channels = run_in_batches(
        &text_channels,
        config.channel_batch_size,
        config.channel_batch_delay,
        |channel| scan_channel(source, filter, config, &server, channel, cutoff),
    )
    .await;

    ServerScanResult {
        server_id: server_id.to_string(),
        server_name: Some(server.name),
        outcome: ServerScanOutcome::Scanned { channels },
    }
}

async fn scan_channel(
    source: &dyn MessageSource,
    filter: &dyn MessageFilter,
    config: &ScanConfig,
    server: &SourceServer,
    channel: &SourceChannel,
    cutoff: DateTime<Utc>,
) -> ChannelScanResult {
    let outcome = match source.fetch_messages(&channel.id, config.page_size).await {
        Ok(messages) => scan_page(filter, server, channel, &messages, cutoff),
        Err(error) if error.is_permission_denied() => {
            debug!(
                channel_id = %channel.id,
                channel = %channel.name,
                "no access to channel, skipping"
            );
            ChannelScanOutcome::Skipped {
                reason: error.to_string(),
            }
        }
        Err(error) => {
            warn!(channel_id = %channel.id, channel = %channel.name, %error, "channel scan failed");
            ChannelScanOutcome::Failed {
                error: error.to_string(),
            }
        }
    };
    ChannelScanResult {
        channel_id: channel.id.clone(),
        channel_name: channel.name.clone(),
        outcome,
    }
}

fn scan_page(
    filter: &dyn MessageFilter,
    server: &SourceServer,
    channel: &SourceChannel,
    messages: &[SourceMessage],
    cutoff: DateTime<Utc>,
) -> ChannelScanOutcome {
    let mut messages_examined = 0;
    let mut excluded = 0;
    let mut matches = Vec::new();
    for message in messages {
        let Some(sent_at) = message.created_at() else {
            debug!(message_id = %message.id, "message id does not decode to a timestamp");
            continue;
        };
        if sent_at < cutoff {
            continue;
        }
        messages_examined += 1;
        match evaluate(filter, message) {
            FilterDecision::NoMatch => {}
            FilterDecision::Excluded(reason) => {
                excluded += 1;
                debug!(
                    message_id = %message.id,
                    reason = reason.as_str(),
                    "keyword match excluded"
                );
            }
            FilterDecision::Matched { keywords } => {
                matches.push(MatchCandidate {
                    server_id: server.id.clone(),
                    server_name: server.name.clone(),
                    channel_id: channel.id.clone(),
                    channel_name: channel.name.clone(),
                    message_id: message.id.clone(),
                    author_id: message.author.id.clone(),
                    author_name: message.author.display_name().to_string(),
                    content: message.content.clone(),
                    message_url: message_url(&server.id, &channel.id, &message.id),
                    sent_at,
                    matched_keywords: keywords,
                });
            }
        }
    }
    ChannelScanOutcome::Scanned {
        messages_examined,
        excluded,
        matches,
    }
}
