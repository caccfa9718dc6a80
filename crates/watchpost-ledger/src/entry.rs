use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `(user, emoji)` reaction that has already been relayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotifiedReaction {
    pub user_id: String,
    pub emoji: String,
}

/// One relayed message under observation.
///
/// Identifiers and the thread reference are fixed at creation. The notified
/// sets only ever grow; an entry leaves the ledger through age-based pruning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub message_id: String,
    pub channel_id: String,
    pub server_id: String,
    #[serde(default)]
    pub notification_thread_ref: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    #[serde(default)]
    pub notified_reactions: Vec<NotifiedReaction>,
    #[serde(default)]
    pub notified_replies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_url: Option<String>,
}

impl WatchEntry {
    pub fn new(
        message_id: impl Into<String>,
        channel_id: impl Into<String>,
        server_id: impl Into<String>,
        notification_thread_ref: Option<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            channel_id: channel_id.into(),
            server_id: server_id.into(),
            notification_thread_ref,
            detected_at,
            last_checked_at: detected_at,
            notified_reactions: Vec::new(),
            notified_replies: Vec::new(),
            server_name: None,
            channel_name: None,
            author_name: None,
            message_url: None,
        }
    }

    pub fn has_notified_reaction(&self, user_id: &str, emoji: &str) -> bool {
        self.notified_reactions
            .iter()
            .any(|reaction| reaction.user_id == user_id && reaction.emoji == emoji)
    }

    /// Records a relayed reaction; returns `false` when it was already known.
    pub fn record_reaction(&mut self, user_id: &str, emoji: &str) -> bool {
        if self.has_notified_reaction(user_id, emoji) {
            return false;
        }
        self.notified_reactions.push(NotifiedReaction {
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
        });
        true
    }

    pub fn has_notified_reply(&self, reply_id: &str) -> bool {
        self.notified_replies.iter().any(|known| known == reply_id)
    }

    pub fn record_reply(&mut self, reply_id: &str) -> bool {
        if self.has_notified_reply(reply_id) {
            return false;
        }
        self.notified_replies.push(reply_id.to_string());
        true
    }
}
