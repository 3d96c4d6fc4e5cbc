// ABOUTME: The entry log contract shared by every storage backend.
// ABOUTME: Append-only, scans return ascending entry-id order, conditional appends are atomic.

use crate::entry::{Entry, EntryId, RecordId};
use crate::error::LogError;

/// An append-only sequence of versioned entries.
///
/// Implementations must make an appended entry visible to later scans only
/// once it is fully recorded, and must return scans in ascending `entry_id`
/// order. Callers that need newest-first reverse the result themselves.
pub trait EntryLog: Send + Sync {
    /// Append one entry and return its freshly allocated id.
    fn append(&self, record_id: RecordId, key: &str, value: Option<&str>)
    -> Result<EntryId, LogError>;

    /// Append one entry only if the newest entry for `(record_id, key)`
    /// currently carries `expected` (`None` meaning never written or deleted).
    /// The check and the append happen as one step with respect to other
    /// writers. Fails with `LogError::PreconditionFailed` and appends nothing
    /// when the check does not hold.
    fn append_if(
        &self,
        record_id: RecordId,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<EntryId, LogError>;

    /// All entries for a record, ascending by entry id.
    fn scan_record(&self, record_id: RecordId) -> Result<Vec<Entry>, LogError>;

    /// All entries for one `(record, key)` pair, ascending by entry id.
    fn scan_field(&self, record_id: RecordId, key: &str) -> Result<Vec<Entry>, LogError>;
}

/// Value carried by the newest entry in an ascending slice, `None` when the
/// slice is empty or the newest entry is a deletion marker.
pub fn latest_value(entries: &[Entry]) -> Option<&str> {
    entries.last().and_then(|e| e.value.as_deref())
}
