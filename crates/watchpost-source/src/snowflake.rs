//! Snowflake identifier helpers.
//!
//! Discord ids carry their creation time in the bits above the low 22
//! (worker, process and sequence fields), counted in milliseconds from the
//! Discord epoch.

use chrono::{DateTime, Utc};
use watchpost_core::datetime_from_unix_ms;

/// First millisecond of 2015, the origin of Discord snowflake timestamps.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;
const TIMESTAMP_SHIFT: u32 = 22;

/// Decodes the Unix-millisecond creation time embedded in `id`.
pub fn decode_snowflake_unix_ms(id: &str) -> Option<u64> {
    let raw = id.trim().parse::<u64>().ok()?;
    (raw >> TIMESTAMP_SHIFT).checked_add(DISCORD_EPOCH_MS)
}

pub fn decode_snowflake_datetime(id: &str) -> Option<DateTime<Utc>> {
    decode_snowflake_unix_ms(id).and_then(datetime_from_unix_ms)
}

/// Deep link that opens a message in the Discord client.
pub fn message_url(server_id: &str, channel_id: &str, message_id: &str) -> String {
    format!("https://discord.com/channels/{server_id}/{channel_id}/{message_id}")
}
