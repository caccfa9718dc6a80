use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snowflake::decode_snowflake_datetime;

const TEXT_CHANNEL_KIND: u8 = 0;
const ANNOUNCEMENT_CHANNEL_KIND: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceServer {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

impl SourceChannel {
    /// Text and announcement channels carry scannable message history.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, TEXT_CHANNEL_KIND | ANNOUNCEMENT_CHANNEL_KIND)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl SourceUser {
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.username.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEmoji {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SourceEmoji {
    pub fn unicode(name: &str) -> Self {
        Self {
            id: None,
            name: Some(name.to_string()),
        }
    }

    /// Identity used both in the reactions endpoint path and in dedup keys:
    /// `name:id` for custom emoji, the bare name for unicode emoji.
    pub fn key(&self) -> String {
        let name = self.name.as_deref().unwrap_or_default();
        match self.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("{name}:{id}"),
            None => name.to_string(),
        }
    }

    /// Form used in notification text.
    pub fn display(&self) -> String {
        let name = self.name.as_deref().unwrap_or("?");
        if self.id.is_some() {
            format!(":{name}:")
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReaction {
    pub emoji: SourceEmoji,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    pub author: SourceUser,
    #[serde(default)]
    pub reactions: Vec<SourceReaction>,
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
}

impl SourceMessage {
    /// Send time decoded from the snowflake id, not the receive time.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        decode_snowflake_datetime(&self.id)
    }

    pub fn is_reply_to(&self, message_id: &str) -> bool {
        self.message_reference
            .as_ref()
            .and_then(|reference| reference.message_id.as_deref())
            .is_some_and(|referenced| referenced == message_id)
    }
}
