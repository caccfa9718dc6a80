//! Incremental watcher: relays reactions and replies that appeared on
//! tracked messages since they were last relayed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use watchpost_ledger::{WatchEntry, WatchLedger};
use watchpost_relay::{NotificationPayload, NotificationRelay, ThreadRef};
use watchpost_source::{MessageSource, SourceResult};

use crate::notifications::{render_reaction_follow_up, render_reply_follow_up};
use crate::scan::DEFAULT_PAGE_SIZE;

pub const DEFAULT_ENTRY_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub reply_page_size: usize,
    /// Pause after each entry's check except the last, so a pass over `n`
    /// entries sleeps `n - 1` times and the run is not held up at the end.
    pub entry_delay: Duration,
    pub dry_run: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reply_page_size: DEFAULT_PAGE_SIZE,
            entry_delay: Duration::from_millis(DEFAULT_ENTRY_DELAY_MS),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub entries_checked: usize,
    pub reactions_relayed: usize,
    pub replies_relayed: usize,
    /// Deltas recorded as notified because the entry has no thread to post into.
    pub recorded_without_thread: usize,
    pub relay_failures: usize,
    pub errors: Vec<String>,
}

enum Delivery {
    Relayed,
    RecordedWithoutThread,
    Failed,
}

async fn deliver(
    relay: &dyn NotificationRelay,
    thread: Option<&ThreadRef>,
    payload: NotificationPayload,
    config: &WatchConfig,
    report: &mut WatchReport,
) -> Delivery {
    let Some(thread) = thread else {
        report.recorded_without_thread += 1;
        return Delivery::RecordedWithoutThread;
    };
    if config.dry_run {
        info!(thread = %thread, text = %payload.text, "dry run: follow-up not relayed");
        return Delivery::Relayed;
    }
    match relay.post_follow_up(thread, &payload).await {
        Ok(()) => Delivery::Relayed,
        Err(error) => {
            warn!(thread = %thread, %error, "follow-up relay failed, will retry next run");
            report.relay_failures += 1;
            report.errors.push(format!("follow-up in thread {thread}: {error}"));
            Delivery::Failed
        }
    }
}

async fn check_reactions(
    source: &dyn MessageSource,
    relay: &dyn NotificationRelay,
    entry: &mut WatchEntry,
    thread: Option<&ThreadRef>,
    config: &WatchConfig,
    report: &mut WatchReport,
) -> SourceResult<()> {
    let message = source
        .fetch_message(&entry.channel_id, &entry.message_id)
        .await?;
    for reaction in &message.reactions {
        let emoji_key = reaction.emoji.key();
        let users = source
            .fetch_reaction_users(&entry.channel_id, &entry.message_id, &reaction.emoji)
            .await?;
        for user in users {
            if entry.has_notified_reaction(&user.id, &emoji_key) {
                continue;
            }
            let payload = render_reaction_follow_up(entry, &user, &reaction.emoji);
            match deliver(relay, thread, payload, config, report).await {
                Delivery::Relayed => {
                    report.reactions_relayed += 1;
                    entry.record_reaction(&user.id, &emoji_key);
                }
                Delivery::RecordedWithoutThread => {
                    entry.record_reaction(&user.id, &emoji_key);
                }
                Delivery::Failed => {}
            }
        }
    }
    Ok(())
}

async fn check_replies(
    source: &dyn MessageSource,
    relay: &dyn NotificationRelay,
    entry: &mut WatchEntry,
    thread: Option<&ThreadRef>,
    config: &WatchConfig,
    report: &mut WatchReport,
) -> SourceResult<()> {
    let recent = source
        .fetch_messages(&entry.channel_id, config.reply_page_size)
        .await?;
    // Pages arrive newest first; relay replies in the order they were sent.
    for reply in recent.iter().rev() {
        if !reply.is_reply_to(&entry.message_id) || entry.has_notified_reply(&reply.id) {
            continue;
        }
        let payload = render_reply_follow_up(entry, reply);
        match deliver(relay, thread, payload, config, report).await {
            Delivery::Relayed => {
                report.replies_relayed += 1;
                entry.record_reply(&reply.id);
            }
            Delivery::RecordedWithoutThread => {
                entry.record_reply(&reply.id);
            }
            Delivery::Failed => {}
        }
    }
    Ok(())
}

/// Checks every ledger entry in order, relaying new reactions and replies
/// as threaded follow-ups. A delta is recorded only once its relay
/// succeeded; entries without a thread record deltas silently.
pub async fn watch_entries(
    source: &dyn MessageSource,
    relay: &dyn NotificationRelay,
    ledger: &mut WatchLedger,
    config: &WatchConfig,
    now: DateTime<Utc>,
) -> WatchReport {
    let mut report = WatchReport::default();
    let total = ledger.len();
    info!(entries = total, "checking tracked messages for reactions and replies");

    for (index, entry) in ledger.entries_mut().iter_mut().enumerate() {
        if index > 0 && !config.entry_delay.is_zero() {
            tokio::time::sleep(config.entry_delay).await;
        }
        report.entries_checked += 1;
        let thread = entry.notification_thread_ref.clone().map(ThreadRef::new);

        if let Err(error) =
            check_reactions(source, relay, entry, thread.as_ref(), config, &mut report).await
        {
            warn!(message_id = %entry.message_id, %error, "reaction check failed");
            report.errors.push(format!(
                "reactions for message {} in channel {}: {error}",
                entry.message_id, entry.channel_id
            ));
        }
        if let Err(error) =
            check_replies(source, relay, entry, thread.as_ref(), config, &mut report).await
        {
            warn!(message_id = %entry.message_id, %error, "reply check failed");
            report.errors.push(format!(
                "replies for message {} in channel {}: {error}",
                entry.message_id, entry.channel_id
            ));
        }
        entry.last_checked_at = now;
        debug!(
            message_id = %entry.message_id,
            reactions = entry.notified_reactions.len(),
            replies = entry.notified_replies.len(),
            "tracked message checked"
        );
    }
    report
}
