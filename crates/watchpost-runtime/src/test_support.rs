use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use watchpost_relay::{NotificationPayload, NotificationRelay, RelayError, RelayResult, ThreadRef};
use watchpost_source::snowflake::DISCORD_EPOCH_MS;
use watchpost_source::{
    MessageReference, MessageSource, SourceChannel, SourceEmoji, SourceError, SourceMessage,
    SourceReaction, SourceResult, SourceServer, SourceUser,
};

/// Builds a message id whose decoded send time is `at`.
pub(crate) fn snowflake_at(at: DateTime<Utc>, sequence: u64) -> String {
    let ms = at.timestamp_millis() as u64 - DISCORD_EPOCH_MS;
    ((ms << 22) | (sequence & 0x3f_ffff)).to_string()
}

pub(crate) fn user(id: &str, username: &str) -> SourceUser {
    SourceUser {
        id: id.to_string(),
        username: username.to_string(),
        global_name: None,
    }
}

pub(crate) fn message(
    id: &str,
    channel_id: &str,
    author: SourceUser,
    content: &str,
) -> SourceMessage {
    SourceMessage {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        content: content.to_string(),
        author,
        reactions: Vec::new(),
        message_reference: None,
    }
}

pub(crate) fn reply_to(mut reply: SourceMessage, message_id: &str) -> SourceMessage {
    reply.message_reference = Some(MessageReference {
        message_id: Some(message_id.to_string()),
        channel_id: Some(reply.channel_id.clone()),
    });
    reply
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeFailure {
    Denied,
    Status(u16),
}

impl FakeFailure {
    fn into_error(self, operation: &str) -> SourceError {
        match self {
            Self::Denied => SourceError::PermissionDenied {
                operation: operation.to_string(),
                status: 403,
            },
            Self::Status(status) => SourceError::Status {
                operation: operation.to_string(),
                status,
                body: "fake failure".to_string(),
            },
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    pub servers: HashMap<String, SourceServer>,
    pub channels: HashMap<String, Vec<SourceChannel>>,
    pub messages: Mutex<HashMap<String, Vec<SourceMessage>>>,
    pub reaction_users: Mutex<HashMap<(String, String), Vec<SourceUser>>>,
    pub failures: HashMap<String, FakeFailure>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub message_fetches: AtomicUsize,
    /// Concurrent server and channel-list lookups.
    pub server_lookups_in_flight: AtomicUsize,
    pub max_server_lookups_in_flight: AtomicUsize,
}

/// Counts a call as in flight across one scheduler yield.
async fn track_in_flight(in_flight: &AtomicUsize, max_in_flight: &AtomicUsize) {
    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    max_in_flight.fetch_max(current, Ordering::SeqCst);
    tokio::task::yield_now().await;
    in_flight.fetch_sub(1, Ordering::SeqCst);
}

impl FakeSource {
    pub fn with_server(mut self, id: &str, name: &str, channels: &[(&str, &str, u8)]) -> Self {
        self.servers.insert(
            id.to_string(),
            SourceServer {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        self.channels.insert(
            id.to_string(),
            channels
                .iter()
                .map(|(channel_id, channel_name, kind)| SourceChannel {
                    id: channel_id.to_string(),
                    name: channel_name.to_string(),
                    kind: *kind,
                })
                .collect(),
        );
        self
    }

    /// Fails every call whose key (server id or channel id) matches.
    pub fn failing(mut self, key: &str, failure: FakeFailure) -> Self {
        self.failures.insert(key.to_string(), failure);
        self
    }

    pub fn push_message(&self, message: SourceMessage) {
        let mut messages = self.messages.lock().expect("messages lock");
        let page = messages.entry(message.channel_id.clone()).or_default();
        page.insert(0, message);
    }

    /// Adds `user` to the roster of `emoji` on the given message.
    pub fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: SourceEmoji,
        user: SourceUser,
    ) {
        let key = emoji.key();
        {
            let mut messages = self.messages.lock().expect("messages lock");
            let target = messages
                .get_mut(channel_id)
                .and_then(|page| page.iter_mut().find(|message| message.id == message_id))
                .expect("reaction target exists");
            match target
                .reactions
                .iter_mut()
                .find(|reaction| reaction.emoji.key() == key)
            {
                Some(reaction) => reaction.count += 1,
                None => target.reactions.push(SourceReaction { emoji, count: 1 }),
            }
        }
        self.reaction_users
            .lock()
            .expect("roster lock")
            .entry((message_id.to_string(), key))
            .or_default()
            .push(user);
    }

    fn check(&self, key: &str, operation: &str) -> SourceResult<()> {
        match self.failures.get(key) {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn fetch_server(&self, server_id: &str) -> SourceResult<SourceServer> {
        track_in_flight(&self.server_lookups_in_flight, &self.max_server_lookups_in_flight).await;
        self.check(server_id, "guild")?;
        self.servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| FakeFailure::Status(404).into_error("guild"))
    }

    async fn fetch_channels(&self, server_id: &str) -> SourceResult<Vec<SourceChannel>> {
        track_in_flight(&self.server_lookups_in_flight, &self.max_server_lookups_in_flight).await;
        Ok(self.channels.get(server_id).cloned().unwrap_or_default())
    }

    async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> SourceResult<Vec<SourceMessage>> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        track_in_flight(&self.in_flight, &self.max_in_flight).await;

        self.check(channel_id, "channel messages")?;
        let messages = self.messages.lock().expect("messages lock");
        Ok(messages
            .get(channel_id)
            .map(|page| page.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> SourceResult<SourceMessage> {
        self.check(channel_id, "message")?;
        let messages = self.messages.lock().expect("messages lock");
        messages
            .get(channel_id)
            .and_then(|page| page.iter().find(|message| message.id == message_id))
            .cloned()
            .ok_or_else(|| FakeFailure::Status(404).into_error("message"))
    }

    async fn fetch_reaction_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &SourceEmoji,
    ) -> SourceResult<Vec<SourceUser>> {
        self.check(channel_id, "reaction users")?;
        Ok(self
            .reaction_users
            .lock()
            .expect("roster lock")
            .get(&(message_id.to_string(), emoji.key()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every delivery; thread handles are `ts-<n>` unless disabled.
#[derive(Default)]
pub(crate) struct FakeRelay {
    pub notifications: Mutex<Vec<NotificationPayload>>,
    pub follow_ups: Mutex<Vec<(ThreadRef, NotificationPayload)>>,
    pub without_threads: bool,
    pub fail_notifications: Mutex<bool>,
    pub fail_follow_ups: Mutex<bool>,
}

impl FakeRelay {
    pub fn without_threads() -> Self {
        Self {
            without_threads: true,
            ..Self::default()
        }
    }

    pub fn set_fail_follow_ups(&self, fail: bool) {
        *self.fail_follow_ups.lock().expect("flag lock") = fail;
    }

    pub fn set_fail_notifications(&self, fail: bool) {
        *self.fail_notifications.lock().expect("flag lock") = fail;
    }

    pub fn notification_texts(&self) -> Vec<String> {
        self.notifications
            .lock()
            .expect("notifications lock")
            .iter()
            .map(|payload| payload.text.clone())
            .collect()
    }

    pub fn follow_up_texts(&self) -> Vec<String> {
        self.follow_ups
            .lock()
            .expect("follow-ups lock")
            .iter()
            .map(|(_, payload)| payload.text.clone())
            .collect()
    }
}

fn rejected(operation: &str) -> RelayError {
    RelayError::Rejected {
        operation: operation.to_string(),
        error: "channel_not_found".to_string(),
    }
}

#[async_trait]
impl NotificationRelay for FakeRelay {
    async fn post_notification(
        &self,
        payload: &NotificationPayload,
    ) -> RelayResult<Option<ThreadRef>> {
        if *self.fail_notifications.lock().expect("flag lock") {
            return Err(rejected("chat.postMessage"));
        }
        let mut notifications = self.notifications.lock().expect("notifications lock");
        notifications.push(payload.clone());
        if self.without_threads {
            return Ok(None);
        }
        Ok(Some(ThreadRef::new(format!("ts-{}", notifications.len()))))
    }

    async fn post_follow_up(
        &self,
        thread: &ThreadRef,
        payload: &NotificationPayload,
    ) -> RelayResult<()> {
        if *self.fail_follow_ups.lock().expect("flag lock") {
            return Err(rejected("chat.postMessage"));
        }
        self.follow_ups
            .lock()
            .expect("follow-ups lock")
            .push((thread.clone(), payload.clone()));
        Ok(())
    }
}
