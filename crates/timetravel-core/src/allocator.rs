// ABOUTME: Process-wide entry-id allocator backed by a single atomic counter.
// ABOUTME: Seeded once from the highest id already stored, then only ever incremented.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::entry::EntryId;

/// Hands out unique, strictly increasing entry ids to concurrent callers.
#[derive(Debug)]
pub struct EntryIdAllocator {
    next: AtomicU64,
}

impl EntryIdAllocator {
    /// A fresh allocator for an empty log. The first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Resume after recovery: the first id handed out is `highest_seen + 1`.
    /// `None` when `highest_seen` is already the largest representable id.
    pub fn starting_after(highest_seen: EntryId) -> Option<Self> {
        let next = highest_seen.checked_add(1)?;
        Some(Self {
            next: AtomicU64::new(next),
        })
    }

    /// Allocate the next id. Linearizable: no two callers see the same value.
    pub fn next(&self) -> EntryId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next call to `next()` would return.
    pub fn peek(&self) -> EntryId {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for EntryIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
