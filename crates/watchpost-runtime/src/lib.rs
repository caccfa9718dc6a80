//! Tracked-message lifecycle engine for watchpost.
//!
//! A run scans configured servers for keyword matches inside a lookback
//! window, relays each new match and starts tracking it in the watch ledger,
//! prunes entries past retention, and relays reactions and replies that
//! appeared on tracked messages since the previous run.

pub mod filter;
pub mod notifications;
pub mod runner;
pub mod scan;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use filter::{
    evaluate, is_excluded, is_excluded_author, matches, ExclusionReason, FilterDecision,
    KeywordFilter, MessageFilter,
};
pub use runner::{run_once, RunConfig, RunSummary, DEFAULT_LOOKBACK_HOURS};
pub use scan::{
    scan_servers, ChannelScanOutcome, ChannelScanResult, MatchCandidate, ScanConfig, ScanReport,
    ServerScanOutcome, ServerScanResult,
};
pub use watcher::{watch_entries, WatchConfig, WatchReport};
