// ABOUTME: Durable in-memory entry log that writes every entry to a JSONL journal first.
// ABOUTME: Reads are served from memory; the journal is replayed on open to rebuild state.

use std::path::Path;

use parking_lot::Mutex;
use timetravel_core::{Entry, EntryId, EntryLog, LogError, MemoryLog, RecordId};

use crate::jsonl::JsonlLog;
use crate::recovery::{RecoveryError, recover_journal};

/// An entry log kept in memory and journaled to a JSONL file.
///
/// An entry becomes visible to scans only after its journal line has been
/// written and fsynced. The file has a single writer position, so journal
/// writes are serialized by `writer`; everything else follows `MemoryLog`'s
/// per-record locking.
pub struct JournalLog {
    memory: MemoryLog,
    writer: Mutex<JsonlLog>,
}

impl JournalLog {
    /// Recover from the journal at `path` (if any) and open it for appends.
    pub fn open(path: &Path) -> Result<Self, RecoveryError> {
        let memory = recover_journal(path)?;
        let writer = JsonlLog::open(path)?;
        Ok(Self {
            memory,
            writer: Mutex::new(writer),
        })
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn persist(&self, entry: &Entry) -> Result<(), LogError> {
        self.writer.lock().append(entry)?;
        Ok(())
    }
}

impl EntryLog for JournalLog {
    fn append(
        &self,
        record_id: RecordId,
        key: &str,
        value: Option<&str>,
    ) -> Result<EntryId, LogError> {
        self.memory
            .append_with(record_id, key, None, value, |entry| self.persist(entry))
    }

    fn append_if(
        &self,
        record_id: RecordId,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<EntryId, LogError> {
        self.memory
            .append_with(record_id, key, Some(expected), value, |entry| {
                self.persist(entry)
            })
    }

    fn scan_record(&self, record_id: RecordId) -> Result<Vec<Entry>, LogError> {
        self.memory.scan_record(record_id)
    }

    fn scan_field(&self, record_id: RecordId, key: &str) -> Result<Vec<Entry>, LogError> {
        self.memory.scan_field(record_id, key)
    }
}
