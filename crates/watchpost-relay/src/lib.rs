//! Outbound notification relay for watchpost.
//!
//! A relay posts top-level notifications, which may hand back a
//! [`ThreadRef`], and threaded follow-ups under such a reference. Calls are
//! single-attempt: retrying is left to callers, which only record a delta
//! as notified after the relay reported success.

mod error;
mod slack;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{RelayError, RelayResult};
pub use slack::{SlackRelayClient, SlackRelayTarget, DEFAULT_SLACK_API_BASE};

/// Opaque handle of a posted notification that follow-ups thread under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadRef(String);

impl ThreadRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plain-text body plus an optional Block Kit layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Value>,
}

impl NotificationPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: None,
        }
    }

    pub fn with_blocks(mut self, blocks: Value) -> Self {
        self.blocks = Some(blocks);
        self
    }
}

#[async_trait]
/// Destination for new-match notifications and their threaded follow-ups.
pub trait NotificationRelay: Send + Sync {
    /// Posts a top-level notification. `Ok(None)` means delivery succeeded
    /// but the destination handed back no thread handle.
    async fn post_notification(&self, payload: &NotificationPayload)
        -> RelayResult<Option<ThreadRef>>;

    async fn post_follow_up(&self, thread: &ThreadRef, payload: &NotificationPayload)
        -> RelayResult<()>;
}
