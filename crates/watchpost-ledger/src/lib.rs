//! Persisted watch ledger: the messages watchpost keeps following after
//! they were relayed.
//!
//! The ledger is loaded once at the start of a run, mutated in memory by the
//! single task that owns it, pruned by age, and written back wholesale once
//! at the end of the run.

mod entry;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use watchpost_core::{hours_duration, write_text_atomic};

pub use entry::{NotifiedReaction, WatchEntry};

pub const LEDGER_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_RETENTION_HOURS: u64 = 72;

/// Default retention window applied by [`WatchLedger::prune`] callers.
pub fn default_retention() -> Duration {
    hours_duration(DEFAULT_RETENTION_HOURS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerDocument {
    schema_version: u32,
    #[serde(default)]
    entries: Vec<WatchEntry>,
}

/// How the in-memory ledger was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLoadOutcome {
    /// No ledger file existed yet.
    Fresh,
    Loaded { entries: usize },
    /// The file was unreadable or corrupt; the run starts from an empty ledger.
    Recovered { reason: String },
}

/// Parses a ledger document, rejecting unknown schema versions.
pub fn parse_ledger_document(raw: &str) -> Result<Vec<WatchEntry>> {
    let document =
        serde_json::from_str::<LedgerDocument>(raw).context("failed to parse ledger document")?;
    if document.schema_version != LEDGER_SCHEMA_VERSION {
        bail!(
            "unsupported ledger schema: expected {}, found {}",
            LEDGER_SCHEMA_VERSION,
            document.schema_version
        );
    }
    Ok(document.entries)
}

pub fn render_ledger_document(entries: &[WatchEntry]) -> Result<String> {
    let document = LedgerDocument {
        schema_version: LEDGER_SCHEMA_VERSION,
        entries: entries.to_vec(),
    };
    let mut payload =
        serde_json::to_string_pretty(&document).context("failed to serialize ledger")?;
    payload.push('\n');
    Ok(payload)
}

#[derive(Debug)]
pub struct WatchLedger {
    path: PathBuf,
    entries: Vec<WatchEntry>,
    load_outcome: LedgerLoadOutcome,
}

impl WatchLedger {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: Vec::new(),
            load_outcome: LedgerLoadOutcome::Fresh,
        }
    }

    /// Loads the ledger at `path`. Never fails: a missing file yields an
    /// empty ledger and an unreadable or corrupt one is logged and replaced
    /// by an empty ledger.
    pub fn load(path: PathBuf) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "no watch ledger found, starting empty");
            return Self::empty(path);
        }

        let parsed = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read ledger file {}", path.display()))
            .and_then(|raw| parse_ledger_document(&raw));
        match parsed {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "loaded watch ledger");
                let mut ledger = Self {
                    path,
                    entries: Vec::with_capacity(entries.len()),
                    load_outcome: LedgerLoadOutcome::Loaded { entries: 0 },
                };
                for entry in entries {
                    if !ledger.upsert(entry) {
                        warn!("dropping duplicate watch entry from ledger file");
                    }
                }
                ledger.load_outcome = LedgerLoadOutcome::Loaded {
                    entries: ledger.entries.len(),
                };
                ledger
            }
            Err(error) => {
                let reason = format!("{error:#}");
                warn!(
                    path = %path.display(),
                    error = %reason,
                    "watch ledger is unreadable, starting empty"
                );
                Self {
                    path,
                    entries: Vec::new(),
                    load_outcome: LedgerLoadOutcome::Recovered { reason },
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_outcome(&self) -> &LedgerLoadOutcome {
        &self.load_outcome
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [WatchEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, message_id: &str, channel_id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.message_id == message_id && entry.channel_id == channel_id)
    }

    pub fn get(&self, message_id: &str, channel_id: &str) -> Option<&WatchEntry> {
        self.entries
            .iter()
            .find(|entry| entry.message_id == message_id && entry.channel_id == channel_id)
    }

    /// Appends `entry` unless its (message, channel) key is already tracked,
    /// in which case the existing entry is left untouched and `false` is
    /// returned.
    pub fn upsert(&mut self, entry: WatchEntry) -> bool {
        if self.contains(&entry.message_id, &entry.channel_id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Removes entries detected strictly before `now - max_age` and returns
    /// how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let cutoff = now
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.entries.len();
        self.entries.retain(|entry| entry.detected_at >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, cutoff = %cutoff.to_rfc3339(), "pruned expired watch entries");
        }
        removed
    }

    /// Overwrites the ledger file with the full in-memory state.
    pub fn save(&self) -> Result<()> {
        let payload = render_ledger_document(&self.entries)?;
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write ledger file {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "saved watch ledger");
        Ok(())
    }
}
