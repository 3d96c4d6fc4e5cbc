// ABOUTME: Crash recovery for the JSONL journal.
// ABOUTME: Repairs torn writes, replays entries, and rebuilds the in-memory log and allocator.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use timetravel_core::{Entry, LogError, MemoryLog};

use crate::jsonl::{JsonlError, JsonlLog};

/// Errors that can occur during recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("jsonl error: {0}")]
    Jsonl(#[from] JsonlError),

    #[error("cannot rebuild log: {0}")]
    Log(#[from] LogError),
}

impl From<RecoveryError> for LogError {
    fn from(err: RecoveryError) -> Self {
        LogError::storage(err)
    }
}

/// Rebuild an in-memory log from the journal at `path`.
///
/// Recovery sequence:
/// 1. Repair the journal (drop partial or unparseable lines)
/// 2. Replay every remaining entry
/// 3. Drop any repeated entry id, keeping the first occurrence
/// 4. Seed the allocator one past the highest id seen
///
/// A missing journal recovers to an empty log.
pub fn recover_journal(path: &Path) -> Result<MemoryLog, RecoveryError> {
    if !path.exists() {
        tracing::info!("no journal at {}, starting empty", path.display());
        return Ok(MemoryLog::new());
    }

    let (kept, dropped) = JsonlLog::repair(path)?;
    if dropped > 0 {
        tracing::warn!(
            "repaired journal {}: kept {} entries, dropped {} damaged lines",
            path.display(),
            kept,
            dropped
        );
    }

    let replayed = JsonlLog::replay(path)?;
    let total = replayed.len();
    let entries = dedup_entry_ids(replayed);
    if entries.len() != total {
        tracing::warn!(
            "ignored {} journal lines with repeated entry ids",
            total - entries.len()
        );
    }

    let log = MemoryLog::from_entries(entries)?;
    tracing::info!(
        "recovered {} entries from {}, next entry id {}",
        log.len(),
        path.display(),
        log.next_entry_id()
    );
    Ok(log)
}

fn dedup_entry_ids(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.entry_id))
        .collect()
}
