//! Slack payloads for new matches, follow-ups, and the run summary.

use serde_json::{json, Value};
use watchpost_core::truncate_chars;
use watchpost_ledger::WatchEntry;
use watchpost_relay::NotificationPayload;
use watchpost_source::{message_url, SourceEmoji, SourceMessage, SourceUser};

use crate::runner::RunSummary;
use crate::scan::MatchCandidate;

const CONTENT_EXCERPT_CHARS: usize = 1_500;
const REPLY_EXCERPT_CHARS: usize = 600;
/// Slack rejects a mrkdwn text object longer than this.
const BLOCK_TEXT_LIMIT: usize = 3_000;

/// Escapes the three characters Slack mrkdwn treats as control syntax.
pub fn escape_mrkdwn(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn quote(value: &str) -> String {
    value
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Caps already escaped and quoted block text, never splitting an entity.
fn cap_block_text(text: String) -> String {
    if text.chars().count() <= BLOCK_TEXT_LIMIT {
        return text;
    }
    let mut capped = text.chars().take(BLOCK_TEXT_LIMIT - 1).collect::<String>();
    if let Some(amp) = capped.rfind('&') {
        if !capped[amp..].contains(';') {
            capped.truncate(amp);
        }
    }
    capped.push('…');
    capped
}

fn section(text: String) -> Value {
    json!({"type": "section", "text": {"type": "mrkdwn", "text": cap_block_text(text)}})
}

fn context(text: String) -> Value {
    json!({"type": "context", "elements": [{"type": "mrkdwn", "text": cap_block_text(text)}]})
}

pub fn render_match_notification(candidate: &MatchCandidate) -> NotificationPayload {
    let excerpt = escape_mrkdwn(&truncate_chars(&candidate.content, CONTENT_EXCERPT_CHARS));
    let server = escape_mrkdwn(&candidate.server_name);
    let channel = escape_mrkdwn(&candidate.channel_name);
    let author = escape_mrkdwn(&candidate.author_name);
    let sent_at = candidate.sent_at.format("%Y-%m-%d %H:%M UTC");
    let keywords = candidate.matched_keywords.join(", ");

    let text = format!(
        "Keyword match in {server} #{channel} from {author}: {}\n{}",
        escape_mrkdwn(&truncate_chars(&candidate.content, 200)),
        candidate.message_url
    );
    let blocks = json!([
        section(format!(
            "*Keyword match* in *{server}* `#{channel}`\n*{author}* at {sent_at}"
        )),
        section(quote(&excerpt)),
        context(format!(
            "keywords: {} | <{}|open message>",
            escape_mrkdwn(&keywords),
            candidate.message_url
        )),
    ]);
    NotificationPayload::text(text).with_blocks(blocks)
}

fn entry_label(entry: &WatchEntry) -> String {
    match entry.channel_name.as_deref() {
        Some(channel) => format!("#{}", escape_mrkdwn(channel)),
        None => "the watched message".to_string(),
    }
}

pub fn render_reaction_follow_up(
    entry: &WatchEntry,
    user: &SourceUser,
    emoji: &SourceEmoji,
) -> NotificationPayload {
    let who = escape_mrkdwn(user.display_name());
    let emoji = emoji.display();
    let text = format!("{who} reacted {emoji} in {}", entry_label(entry));
    let mut blocks = vec![section(format!("*{who}* reacted {emoji}"))];
    if let Some(url) = entry.message_url.as_deref() {
        blocks.push(context(format!("<{url}|open message>")));
    }
    NotificationPayload::text(text).with_blocks(Value::Array(blocks))
}

pub fn render_reply_follow_up(entry: &WatchEntry, reply: &SourceMessage) -> NotificationPayload {
    let who = escape_mrkdwn(reply.author.display_name());
    let excerpt = escape_mrkdwn(&truncate_chars(&reply.content, REPLY_EXCERPT_CHARS));
    let reply_url = message_url(&entry.server_id, &entry.channel_id, &reply.id);
    let text = format!(
        "{who} replied in {}: {}",
        entry_label(entry),
        escape_mrkdwn(&truncate_chars(&reply.content, 200))
    );
    let blocks = json!([
        section(format!("*{who}* replied")),
        section(quote(&excerpt)),
        context(format!("<{reply_url}|open reply>")),
    ]);
    NotificationPayload::text(text).with_blocks(blocks)
}

pub fn render_run_summary(summary: &RunSummary) -> NotificationPayload {
    let text = format!(
        "watchpost run: servers={} channels={} skipped={} messages={} matches={} notified={} tracked={} reactions={} replies={} errors={}",
        summary.servers_scanned,
        summary.channels_scanned,
        summary.channels_skipped,
        summary.messages_examined,
        summary.matches_found,
        summary.notifications_sent,
        summary.entries_tracked,
        summary.reactions_relayed,
        summary.replies_relayed,
        summary.errors.len(),
    );
    let mut blocks = vec![section(format!(
        "*watchpost run summary*\nservers: {} (errors {}) | channels: {} (skipped {})\nmessages examined: {} | matches: {} | notified: {}\nwatching: {} (pruned {}) | reactions: {} | replies: {}",
        summary.servers_scanned,
        summary.server_errors,
        summary.channels_scanned,
        summary.channels_skipped,
        summary.messages_examined,
        summary.matches_found,
        summary.notifications_sent,
        summary.entries_tracked,
        summary.entries_pruned,
        summary.reactions_relayed,
        summary.replies_relayed,
    ))];
    if !summary.errors.is_empty() {
        let listed = summary
            .errors
            .iter()
            .take(10)
            .map(|error| format!("• {}", escape_mrkdwn(&truncate_chars(error, 300))))
            .collect::<Vec<_>>()
            .join("\n");
        let more = summary.errors.len().saturating_sub(10);
        let suffix = if more > 0 {
            format!("\n…and {more} more")
        } else {
            String::new()
        };
        blocks.push(context(format!("errors:\n{listed}{suffix}")));
    }
    NotificationPayload::text(text).with_blocks(Value::Array(blocks))
}
