//! One scheduled run: load ledger, scan, relay new matches, prune, watch,
//! save, summarize.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use watchpost_core::hours_before;
use watchpost_ledger::{default_retention, LedgerLoadOutcome, WatchEntry, WatchLedger};
use watchpost_relay::NotificationRelay;
use watchpost_source::MessageSource;

use crate::filter::KeywordFilter;
use crate::notifications::{render_match_notification, render_run_summary};
use crate::scan::{scan_servers, MatchCandidate, ScanConfig};
use crate::watcher::{watch_entries, WatchConfig};

pub const DEFAULT_LOOKBACK_HOURS: u64 = 3;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub scan: ScanConfig,
    pub filter: KeywordFilter,
    pub watch: WatchConfig,
    pub lookback_hours: u64,
    pub retention: Duration,
    pub ledger_path: PathBuf,
    /// Scan and watch without relaying anything or saving the ledger.
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(ledger_path: PathBuf, server_ids: Vec<String>, filter: KeywordFilter) -> Self {
        Self {
            scan: ScanConfig {
                server_ids,
                ..ScanConfig::default()
            },
            filter,
            watch: WatchConfig::default(),
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            retention: default_retention(),
            ledger_path,
            dry_run: false,
        }
    }
}

/// End-of-run counters, logged always and relayed when anything was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub servers_scanned: usize,
    pub server_errors: usize,
    pub channels_scanned: usize,
    pub channels_skipped: usize,
    pub messages_examined: usize,
    pub matches_found: usize,
    pub already_tracked: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub entries_pruned: usize,
    pub entries_tracked: usize,
    pub reactions_relayed: usize,
    pub replies_relayed: usize,
    pub ledger_recovered: bool,
    pub ledger_saved: bool,
    pub dry_run: bool,
    pub errors: Vec<String>,
}

fn entry_from_candidate(
    candidate: &MatchCandidate,
    thread_ref: Option<String>,
    now: DateTime<Utc>,
) -> WatchEntry {
    let mut entry = WatchEntry::new(
        candidate.message_id.as_str(),
        candidate.channel_id.as_str(),
        candidate.server_id.as_str(),
        thread_ref,
        now,
    );
    entry.server_name = Some(candidate.server_name.clone());
    entry.channel_name = Some(candidate.channel_name.clone());
    entry.author_name = Some(candidate.author_name.clone());
    entry.message_url = Some(candidate.message_url.clone());
    entry
}

async fn relay_new_matches(
    relay: &dyn NotificationRelay,
    ledger: &mut WatchLedger,
    candidates: Vec<&MatchCandidate>,
    dry_run: bool,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) {
    for candidate in candidates {
        if ledger.contains(&candidate.message_id, &candidate.channel_id) {
            summary.already_tracked += 1;
            continue;
        }
        let payload = render_match_notification(candidate);
        if dry_run {
            info!(
                message_id = %candidate.message_id,
                channel = %candidate.channel_name,
                text = %payload.text,
                "dry run: match not relayed"
            );
            continue;
        }
        match relay.post_notification(&payload).await {
            Ok(thread) => {
                summary.notifications_sent += 1;
                info!(
                    message_id = %candidate.message_id,
                    channel = %candidate.channel_name,
                    threaded = thread.is_some(),
                    "relayed keyword match"
                );
                let thread_ref = thread.map(|thread| thread.as_str().to_string());
                ledger.upsert(entry_from_candidate(candidate, thread_ref, now));
            }
            Err(error) => {
                summary.notification_failures += 1;
                warn!(message_id = %candidate.message_id, %error, "failed to relay keyword match");
                summary.errors.push(format!(
                    "notify message {} in channel {}: {error}",
                    candidate.message_id, candidate.channel_id
                ));
            }
        }
    }
}

/// Executes one complete run against `source` and `relay`. Unit-level
/// failures are folded into the summary; the run itself never fails.
#[instrument(skip_all, fields(ledger = %config.ledger_path.display(), dry_run = config.dry_run))]
pub async fn run_once(
    source: &dyn MessageSource,
    relay: &dyn NotificationRelay,
    config: &RunConfig,
    now: DateTime<Utc>,
) -> RunSummary {
    let mut summary = RunSummary {
        dry_run: config.dry_run,
        ..RunSummary::default()
    };
    let mut ledger = WatchLedger::load(config.ledger_path.clone());
    if let LedgerLoadOutcome::Recovered { reason } = ledger.load_outcome() {
        summary.ledger_recovered = true;
        summary.errors.push(format!("ledger recovered as empty: {reason}"));
    }

    let cutoff = hours_before(now, config.lookback_hours);
    let report = scan_servers(source, &config.filter, &config.scan, cutoff).await;
    summary.servers_scanned = report.servers_scanned();
    summary.server_errors = report.server_errors();
    summary.channels_scanned = report.channels_scanned();
    summary.channels_skipped = report.channels_skipped();
    summary.messages_examined = report.messages_examined();
    summary.errors.extend(report.errors());
    let candidates = report.candidates().collect::<Vec<_>>();
    summary.matches_found = candidates.len();

    relay_new_matches(relay, &mut ledger, candidates, config.dry_run, now, &mut summary).await;

    summary.entries_pruned = ledger.prune(now, config.retention);

    let watch_config = WatchConfig {
        dry_run: config.dry_run,
        ..config.watch.clone()
    };
    let watch = watch_entries(source, relay, &mut ledger, &watch_config, now).await;
    summary.reactions_relayed = watch.reactions_relayed;
    summary.replies_relayed = watch.replies_relayed;
    summary.notification_failures += watch.relay_failures;
    summary.errors.extend(watch.errors);
    summary.entries_tracked = ledger.len();

    if config.dry_run {
        info!("dry run: ledger not saved");
    } else {
        match ledger.save() {
            Ok(()) => summary.ledger_saved = true,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "failed to save watch ledger");
                summary.errors.push(format!("save ledger: {error:#}"));
            }
        }
    }

    info!(
        servers = summary.servers_scanned,
        channels = summary.channels_scanned,
        skipped = summary.channels_skipped,
        messages = summary.messages_examined,
        matches = summary.matches_found,
        notified = summary.notifications_sent,
        tracked = summary.entries_tracked,
        pruned = summary.entries_pruned,
        reactions = summary.reactions_relayed,
        replies = summary.replies_relayed,
        errors = summary.errors.len(),
        "run complete"
    );

    if summary.messages_examined > 0 && !config.dry_run {
        if let Err(error) = relay.post_notification(&render_run_summary(&summary)).await {
            warn!(%error, "failed to relay run summary");
        }
    }
    summary
}
