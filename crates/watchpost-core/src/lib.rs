//! Foundational low-level utilities shared across watchpost crates.
//!
//! Provides the atomic file-write helper used by the watch ledger, time
//! conversions used by snowflake decoding and retention math, and text
//! truncation used when rendering notifications and error bodies.

pub mod atomic_io;
pub mod text;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use text::truncate_chars;
pub use time_utils::{
    current_unix_timestamp_ms, datetime_from_unix_ms, hours_before, hours_duration,
};
