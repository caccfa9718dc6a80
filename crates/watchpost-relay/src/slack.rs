//! Slack delivery through either the Web API or an incoming webhook.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use watchpost_core::truncate_chars;

use crate::{NotificationPayload, NotificationRelay, RelayError, RelayResult, ThreadRef};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackRelayTarget {
    /// `chat.postMessage` with a bot token; replies carry the posted `ts`.
    WebApi {
        api_base: String,
        bot_token: String,
        channel_id: String,
    },
    /// Incoming webhook URL; delivery never yields a thread handle.
    IncomingWebhook { url: String },
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackRelayClient {
    http: reqwest::Client,
    target: SlackRelayTarget,
}

impl std::fmt::Debug for SlackRelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            SlackRelayTarget::WebApi { channel_id, .. } => format!("web-api:{channel_id}"),
            SlackRelayTarget::IncomingWebhook { .. } => "incoming-webhook".to_string(),
        };
        f.debug_struct("SlackRelayClient")
            .field("target", &target)
            .finish_non_exhaustive()
    }
}

impl SlackRelayClient {
    pub fn new(target: SlackRelayTarget) -> Result<Self> {
        let target = match target {
            SlackRelayTarget::WebApi {
                api_base,
                bot_token,
                channel_id,
            } => {
                if bot_token.trim().is_empty() || channel_id.trim().is_empty() {
                    return Err(anyhow!(
                        "slack web api relay requires a bot token and a channel id"
                    ));
                }
                SlackRelayTarget::WebApi {
                    api_base: api_base.trim().trim_end_matches('/').to_string(),
                    bot_token: bot_token.trim().to_string(),
                    channel_id: channel_id.trim().to_string(),
                }
            }
            SlackRelayTarget::IncomingWebhook { url } => {
                if url.trim().is_empty() {
                    return Err(anyhow!("slack webhook url cannot be empty"));
                }
                SlackRelayTarget::IncomingWebhook {
                    url: url.trim().to_string(),
                }
            }
        };

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("watchpost-relay"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to create slack relay client")?;
        Ok(Self { http, target })
    }

    pub fn target(&self) -> &SlackRelayTarget {
        &self.target
    }

    async fn send(
        &self,
        payload: &NotificationPayload,
        thread: Option<&ThreadRef>,
    ) -> RelayResult<Option<ThreadRef>> {
        let mut body = json!({
            "text": payload.text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(blocks) = &payload.blocks {
            body["blocks"] = blocks.clone();
        }
        if let Some(thread) = thread {
            body["thread_ts"] = Value::String(thread.as_str().to_string());
        }

        match &self.target {
            SlackRelayTarget::WebApi {
                api_base,
                bot_token,
                channel_id,
            } => {
                let operation = "chat.postMessage";
                body["channel"] = Value::String(channel_id.clone());
                debug!(operation, threaded = thread.is_some(), "slack relay post");
                let response = self
                    .http
                    .post(format!("{api_base}/chat.postMessage"))
                    .bearer_auth(bot_token)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|error| RelayError::Transport {
                        operation: operation.to_string(),
                        source: error,
                    })?;
                let status = response.status();
                let text = response.text().await.map_err(|error| RelayError::Transport {
                    operation: operation.to_string(),
                    source: error,
                })?;
                if !status.is_success() {
                    return Err(RelayError::Status {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_chars(&text, 800),
                    });
                }
                let parsed = serde_json::from_str::<SlackChatMessageResponse>(&text).map_err(
                    |error| RelayError::Decode {
                        operation: operation.to_string(),
                        source: error,
                    },
                )?;
                if !parsed.ok {
                    return Err(RelayError::Rejected {
                        operation: operation.to_string(),
                        error: parsed
                            .error
                            .unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                let thread_ref = parsed
                    .ts
                    .map(|ts| ts.trim().to_string())
                    .filter(|ts| !ts.is_empty())
                    .map(ThreadRef::new);
                if thread_ref.is_none() {
                    warn!(operation, "slack accepted the message but returned no ts");
                }
                Ok(thread_ref)
            }
            SlackRelayTarget::IncomingWebhook { url } => {
                let operation = "incoming webhook";
                debug!(operation, threaded = thread.is_some(), "slack relay post");
                let response = self
                    .http
                    .post(url.as_str())
                    .json(&body)
                    .send()
                    .await
                    .map_err(|error| RelayError::Transport {
                        operation: operation.to_string(),
                        source: error,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(RelayError::Status {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_chars(&text, 800),
                    });
                }
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl NotificationRelay for SlackRelayClient {
    async fn post_notification(
        &self,
        payload: &NotificationPayload,
    ) -> RelayResult<Option<ThreadRef>> {
        self.send(payload, None).await
    }

    async fn post_follow_up(
        &self,
        thread: &ThreadRef,
        payload: &NotificationPayload,
    ) -> RelayResult<()> {
        self.send(payload, Some(thread)).await.map(|_| ())
    }
}
