// ABOUTME: In-memory entry log: a table of per-record entry lists keyed by record id.
// ABOUTME: Each record has its own lock so writers to different records never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::allocator::EntryIdAllocator;
use crate::entry::{Entry, EntryId, RecordId};
use crate::error::LogError;
use crate::log::EntryLog;

type Slot = Arc<Mutex<Vec<Entry>>>;

/// An `EntryLog` held entirely in process memory.
///
/// Entry ids come from one shared atomic allocator. An id is allocated while
/// the record's lock is held, so each per-record list stays sorted by id.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: RwLock<HashMap<RecordId, Slot>>,
    ids: EntryIdAllocator,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously stored entries, in any order. The
    /// allocator resumes after the highest id found. Fails when that id is
    /// already `u64::MAX`.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self, LogError> {
        let mut table: HashMap<RecordId, Vec<Entry>> = HashMap::new();
        let mut highest: EntryId = 0;
        for entry in entries {
            highest = highest.max(entry.entry_id);
            table.entry(entry.record_id).or_default().push(entry);
        }

        let records = table
            .into_iter()
            .map(|(id, mut list)| {
                list.sort_by_key(|e| e.entry_id);
                (id, Arc::new(Mutex::new(list)))
            })
            .collect();

        let ids = EntryIdAllocator::starting_after(highest)
            .ok_or(LogError::IdsExhausted { highest })?;
        Ok(Self {
            records: RwLock::new(records),
            ids,
        })
    }

    /// Number of entries across all records.
    pub fn len(&self) -> usize {
        self.records.read().values().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The id the next append will receive.
    pub fn next_entry_id(&self) -> EntryId {
        self.ids.peek()
    }

    fn slot(&self, record_id: RecordId) -> Option<Slot> {
        self.records.read().get(&record_id).cloned()
    }

    fn slot_or_create(&self, record_id: RecordId) -> Slot {
        if let Some(slot) = self.slot(record_id) {
            return slot;
        }
        Arc::clone(self.records.write().entry(record_id).or_default())
    }

    /// Append under the record's lock, running `persist` on the new entry
    /// before it becomes visible. If `persist` fails nothing is added, though
    /// the allocated id is consumed.
    ///
    /// `expected` of `Some(v)` makes the append conditional on the field's
    /// current value being `v`; `None` appends unconditionally.
    pub fn append_with<F>(
        &self,
        record_id: RecordId,
        key: &str,
        expected: Option<Option<&str>>,
        value: Option<&str>,
        persist: F,
    ) -> Result<EntryId, LogError>
    where
        F: FnOnce(&Entry) -> Result<(), LogError>,
    {
        let slot = self.slot_or_create(record_id);
        let mut entries = slot.lock();

        if let Some(expected) = expected {
            let actual = entries
                .iter()
                .rev()
                .find(|e| e.key == key)
                .and_then(|e| e.value.as_deref());
            if actual != expected {
                return Err(LogError::PreconditionFailed {
                    expected: expected.map(str::to_string),
                    actual: actual.map(str::to_string),
                });
            }
        }

        let entry = Entry {
            entry_id: self.ids.next(),
            record_id,
            key: key.to_string(),
            value: value.map(str::to_string),
        };
        persist(&entry)?;

        let entry_id = entry.entry_id;
        entries.push(entry);
        Ok(entry_id)
    }
}

impl EntryLog for MemoryLog {
    fn append(
        &self,
        record_id: RecordId,
        key: &str,
        value: Option<&str>,
    ) -> Result<EntryId, LogError> {
        self.append_with(record_id, key, None, value, |_| Ok(()))
    }

    fn append_if(
        &self,
        record_id: RecordId,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<EntryId, LogError> {
        self.append_with(record_id, key, Some(expected), value, |_| Ok(()))
    }

    fn scan_record(&self, record_id: RecordId) -> Result<Vec<Entry>, LogError> {
        Ok(self
            .slot(record_id)
            .map(|slot| slot.lock().clone())
            .unwrap_or_default())
    }

    fn scan_field(&self, record_id: RecordId, key: &str) -> Result<Vec<Entry>, LogError> {
        Ok(self
            .slot(record_id)
            .map(|slot| {
                slot.lock()
                    .iter()
                    .filter(|e| e.key == key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
