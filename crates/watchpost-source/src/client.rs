//! Discord REST API client used by scan and watch passes.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use watchpost_core::truncate_chars;

use crate::error::{SourceError, SourceResult};
use crate::models::{SourceChannel, SourceEmoji, SourceMessage, SourceServer, SourceUser};
use crate::retry::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
};
use crate::{MessageSource, MAX_PAGE_SIZE};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone)]
pub struct DiscordApiConfig {
    pub api_base: String,
    pub token: String,
    /// Zero leaves the transport default in place.
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for DiscordApiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            token: String::new(),
            request_timeout_ms: 0,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Clone)]
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: Url,
    auth_header: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl std::fmt::Debug for DiscordApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordApiClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl DiscordApiClient {
    pub fn new(config: DiscordApiConfig) -> Result<Self> {
        let token = config.token.trim();
        if token.is_empty() {
            return Err(anyhow!("discord token cannot be empty"));
        }
        let api_base = Url::parse(config.api_base.trim().trim_end_matches('/'))
            .with_context(|| format!("invalid discord api base '{}'", config.api_base))?;
        if api_base.cannot_be_a_base() {
            return Err(anyhow!(
                "discord api base '{}' cannot carry a path",
                config.api_base
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("watchpost (keyword relay, 0.1)"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let mut builder = reqwest::Client::builder().default_headers(headers);
        if config.request_timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.request_timeout_ms));
        }
        let http = builder
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base,
            auth_header: format!("Bot {token}"),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> SourceResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidRequest("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(
        &self,
        operation: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> SourceResult<T>
    where
        T: DeserializeOwned,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            debug!(operation, url = %url, attempt, "discord request");
            let response = self
                .http
                .get(url.clone())
                .query(query)
                .header(reqwest::header::AUTHORIZATION, self.auth_header.as_str())
                .send()
                .await;
            let response = match response {
                Ok(response) => response,
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        warn!(operation, attempt, %error, "discord transport error, retrying");
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(SourceError::Transport {
                        operation: operation.to_string(),
                        source: error,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                let bytes = response.bytes().await.map_err(|error| SourceError::Transport {
                    operation: operation.to_string(),
                    source: error,
                })?;
                return serde_json::from_slice::<T>(&bytes).map_err(|error| SourceError::Decode {
                    operation: operation.to_string(),
                    source: error,
                });
            }

            if status == StatusCode::FORBIDDEN {
                return Err(SourceError::PermissionDenied {
                    operation: operation.to_string(),
                    status: status.as_u16(),
                });
            }

            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                warn!(
                    operation,
                    attempt,
                    status = status.as_u16(),
                    "discord request throttled or unavailable, retrying"
                );
                tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, retry_after))
                    .await;
                continue;
            }

            return Err(SourceError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: truncate_chars(&body, 800),
            });
        }
    }
}

fn page_limit(limit: usize) -> String {
    limit.clamp(1, MAX_PAGE_SIZE).to_string()
}

#[async_trait]
impl MessageSource for DiscordApiClient {
    async fn fetch_server(&self, server_id: &str) -> SourceResult<SourceServer> {
        let url = self.endpoint(&["guilds", server_id])?;
        self.get_json("guild", url, &[]).await
    }

    async fn fetch_channels(&self, server_id: &str) -> SourceResult<Vec<SourceChannel>> {
        let url = self.endpoint(&["guilds", server_id, "channels"])?;
        self.get_json("guild channels", url, &[]).await
    }

    async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> SourceResult<Vec<SourceMessage>> {
        let url = self.endpoint(&["channels", channel_id, "messages"])?;
        self.get_json("channel messages", url, &[("limit", page_limit(limit))])
            .await
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> SourceResult<SourceMessage> {
        let url = self.endpoint(&["channels", channel_id, "messages", message_id])?;
        self.get_json("channel message", url, &[]).await
    }

    async fn fetch_reaction_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &SourceEmoji,
    ) -> SourceResult<Vec<SourceUser>> {
        let emoji_key = emoji.key();
        if emoji_key.is_empty() {
            return Err(SourceError::InvalidRequest(
                "reaction emoji has neither name nor id".to_string(),
            ));
        }
        let url = self.endpoint(&[
            "channels",
            channel_id,
            "messages",
            message_id,
            "reactions",
            emoji_key.as_str(),
        ])?;
        // The roster is paged by user id; a short page ends it.
        let mut users: Vec<SourceUser> = Vec::new();
        let mut after = "0".to_string();
        loop {
            let page: Vec<SourceUser> = self
                .get_json(
                    "message reactions",
                    url.clone(),
                    &[
                        ("limit", page_limit(MAX_PAGE_SIZE)),
                        ("after", after.clone()),
                    ],
                )
                .await?;
            let page_len = page.len();
            let next = page.last().map(|user| user.id.clone());
            users.extend(page);
            match next {
                Some(next) if page_len >= MAX_PAGE_SIZE && next != after => after = next,
                _ => break,
            }
        }
        Ok(users)
    }
}
