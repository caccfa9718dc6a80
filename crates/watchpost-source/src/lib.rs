//! Read-only Discord REST client used by watchpost scans and watchers.
//!
//! The [`MessageSource`] trait is the seam the runtime depends on; the
//! [`DiscordApiClient`] is the production implementation. Failures are typed
//! through [`SourceError`] so callers can tell an expected permission denial
//! apart from a transient remote error.

mod client;
mod error;
mod models;
mod retry;
pub mod snowflake;

use async_trait::async_trait;

pub use client::{DiscordApiClient, DiscordApiConfig, DEFAULT_DISCORD_API_BASE};
pub use error::{SourceError, SourceResult};
pub use models::{
    MessageReference, SourceChannel, SourceEmoji, SourceMessage, SourceReaction, SourceServer,
    SourceUser,
};
pub use snowflake::{decode_snowflake_datetime, decode_snowflake_unix_ms, message_url};

/// Maximum page size accepted by the messages and reactions endpoints.
pub const MAX_PAGE_SIZE: usize = 100;

#[async_trait]
/// Read operations the scan orchestrator and incremental watcher need.
pub trait MessageSource: Send + Sync {
    async fn fetch_server(&self, server_id: &str) -> SourceResult<SourceServer>;

    async fn fetch_channels(&self, server_id: &str) -> SourceResult<Vec<SourceChannel>>;

    /// Most recent page of messages, newest first.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> SourceResult<Vec<SourceMessage>>;

    /// Single message including its reaction summary.
    async fn fetch_message(&self, channel_id: &str, message_id: &str)
        -> SourceResult<SourceMessage>;

    /// Every user who applied `emoji`, across all roster pages.
    async fn fetch_reaction_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &SourceEmoji,
    ) -> SourceResult<Vec<SourceUser>>;
}
