// ABOUTME: Error types for the entry log contract and the record operations built on it.
// ABOUTME: LogError is what backends report; RecordError is what callers of the core see.

use thiserror::Error;

use crate::entry::{EntryId, RecordId};

/// Boxed backend failure carried inside `LogError::StorageIo`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by an `EntryLog` backend.
#[derive(Debug, Error)]
pub enum LogError {
    /// The underlying medium is unreachable or a write failed. No partial
    /// entry is ever visible after this error.
    #[error("storage io: {0}")]
    StorageIo(#[source] BoxError),

    /// A conditional append found a different current value than expected.
    #[error("precondition failed: expected {expected:?}, found {actual:?}")]
    PreconditionFailed {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Stored entries already use the largest possible id, so no new id can
    /// be allocated after them.
    #[error("entry ids exhausted: highest stored id is {highest}")]
    IdsExhausted { highest: EntryId },
}

impl LogError {
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::StorageIo(err.into())
    }
}

/// Errors surfaced at the record boundary (snapshot, history, batch writes).
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid record id {0:?}; id must be a positive number")]
    InvalidId(String),

    #[error("record of id {0} does not exist")]
    RecordNotFound(RecordId),

    #[error("record of id {record_id} has no history for key {key:?}")]
    FieldNotFound { record_id: RecordId, key: String },

    #[error("conflict on key {key:?}: expected {expected:?}, found {actual:?}")]
    Conflict {
        key: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("storage io: {0}")]
    StorageIo(#[source] BoxError),

    /// A batch stopped at `key`. The `applied` entries before it stay in the log.
    #[error("batch aborted at key {key:?} after {applied} applied entries: {source}")]
    BatchAborted {
        key: String,
        applied: usize,
        #[source]
        source: Box<RecordError>,
    },
}

impl RecordError {
    /// The innermost cause, looking through `BatchAborted`.
    pub fn root(&self) -> &RecordError {
        match self {
            RecordError::BatchAborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether repeating the same call may succeed without the caller changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), RecordError::StorageIo(_))
    }
}

impl From<LogError> for RecordError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::StorageIo(source) => RecordError::StorageIo(source),
            err @ LogError::IdsExhausted { .. } => RecordError::StorageIo(Box::new(err)),
            // Key is unknown at this level; the mutation engine rewraps with it.
            LogError::PreconditionFailed { expected, actual } => RecordError::Conflict {
                key: String::new(),
                expected,
                actual,
            },
        }
    }
}
