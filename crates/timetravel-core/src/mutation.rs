// ABOUTME: Mutation engine turning a batch of field changes into appended log entries.
// ABOUTME: Supports unconditional append-all writes and compare-and-set guarded writes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entry::{Record, RecordId};
use crate::error::{LogError, RecordError};
use crate::log::EntryLog;
use crate::resolve::resolve;

/// How a batch is checked before each entry is appended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePolicy {
    /// Append every change unconditionally.
    #[default]
    #[serde(rename = "append", alias = "append_all")]
    AppendAll,
    /// Append a change only if the field still holds the caller's `prev_value`.
    #[serde(rename = "cas", alias = "compare_and_set")]
    CompareAndSet,
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" | "append_all" => Ok(WritePolicy::AppendAll),
            "cas" | "compare_and_set" => Ok(WritePolicy::CompareAndSet),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::AppendAll => write!(f, "append"),
            WritePolicy::CompareAndSet => write!(f, "cas"),
        }
    }
}

/// One requested change to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    /// Replacement value, or `None` to delete the key.
    pub value: Option<String>,
    /// The value the caller last observed. Only consulted under
    /// `CompareAndSet`, where `None` means the caller saw the field absent.
    #[serde(default)]
    pub prev_value: Option<String>,
}

impl FieldUpdate {
    pub fn set(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            prev_value: None,
        }
    }

    pub fn delete() -> Self {
        Self::default()
    }

    pub fn expecting(mut self, prev_value: impl Into<String>) -> Self {
        self.prev_value = Some(prev_value.into());
        self
    }
}

/// Changes keyed by field name. Applied in ascending key order.
pub type Batch = BTreeMap<String, FieldUpdate>;

/// Build an append-all batch from plain `key -> value|null` pairs.
pub fn batch_from_values<I, K>(values: I) -> Batch
where
    I: IntoIterator<Item = (K, Option<String>)>,
    K: Into<String>,
{
    values
        .into_iter()
        .map(|(k, v)| {
            (
                k.into(),
                FieldUpdate {
                    value: v,
                    prev_value: None,
                },
            )
        })
        .collect()
}

/// Applies batches of field changes to an entry log.
#[derive(Clone)]
pub struct MutationEngine {
    log: Arc<dyn EntryLog>,
    require_existing: bool,
}

impl MutationEngine {
    pub fn new(log: Arc<dyn EntryLog>) -> Self {
        Self {
            log,
            require_existing: false,
        }
    }

    /// Reject batches for records that have no entries yet.
    pub fn require_existing(mut self, require: bool) -> Self {
        self.require_existing = require;
        self
    }

    /// Apply `batch` to `record_id` under `policy` and return the record's
    /// fields with the batch folded in.
    ///
    /// Stops at the first failing key. Entries already appended for earlier
    /// keys stay in the log; the error names the failing key and how many
    /// entries were applied before it.
    pub fn apply(
        &self,
        record_id: RecordId,
        batch: &Batch,
        policy: WritePolicy,
    ) -> Result<Record, RecordError> {
        let mut view = match resolve(self.log.as_ref(), record_id) {
            Ok(record) => record,
            Err(RecordError::RecordNotFound(_)) if !self.require_existing => {
                Record::empty(record_id)
            }
            Err(e) => return Err(e),
        };

        for (applied, (key, update)) in batch.iter().enumerate() {
            let value = update.value.as_deref();
            let appended = match policy {
                WritePolicy::AppendAll => self.log.append(record_id, key, value),
                WritePolicy::CompareAndSet => {
                    self.log
                        .append_if(record_id, key, update.prev_value.as_deref(), value)
                }
            };

            let entry_id = appended.map_err(|err| {
                let source = match err {
                    LogError::PreconditionFailed { expected, actual } => {
                        tracing::warn!(
                            %record_id, key = %key, ?expected, ?actual,
                            "compare-and-set conflict"
                        );
                        RecordError::Conflict {
                            key: key.clone(),
                            expected,
                            actual,
                        }
                    }
                    other => {
                        tracing::error!(%record_id, key = %key, error = %other, "append failed");
                        RecordError::from(other)
                    }
                };
                RecordError::BatchAborted {
                    key: key.clone(),
                    applied,
                    source: Box::new(source),
                }
            })?;

            tracing::debug!(%record_id, key = %key, entry_id, %policy, "appended entry");
            view.apply_change(key, value);
        }

        Ok(view)
    }
}
