// ABOUTME: RecordService, the single entry point the HTTP layer talks to.
// ABOUTME: Wraps one entry log with snapshot, history, and batch-write operations.

use std::sync::Arc;

use crate::entry::{FieldHistory, Record, RecordId};
use crate::error::RecordError;
use crate::log::EntryLog;
use crate::mutation::{Batch, MutationEngine, WritePolicy};
use crate::resolve;

/// Read and write access to records backed by a shared entry log.
/// Cheap to clone; clones share the same log.
#[derive(Clone)]
pub struct RecordService {
    log: Arc<dyn EntryLog>,
    engine: MutationEngine,
    default_policy: WritePolicy,
}

impl RecordService {
    pub fn new(log: Arc<dyn EntryLog>) -> Self {
        Self {
            engine: MutationEngine::new(Arc::clone(&log)),
            log,
            default_policy: WritePolicy::default(),
        }
    }

    /// Policy used by `apply_default`.
    pub fn with_default_policy(mut self, policy: WritePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Refuse writes that would implicitly create a record.
    pub fn with_require_existing(mut self, require: bool) -> Self {
        self.engine = self.engine.require_existing(require);
        self
    }

    pub fn default_policy(&self) -> WritePolicy {
        self.default_policy
    }

    pub fn get_snapshot(&self, record_id: RecordId) -> Result<Record, RecordError> {
        resolve::resolve(self.log.as_ref(), record_id)
    }

    pub fn get_history(&self, record_id: RecordId, key: &str) -> Result<FieldHistory, RecordError> {
        resolve::history(self.log.as_ref(), record_id, key)
    }

    pub fn apply_batch(
        &self,
        record_id: RecordId,
        batch: &Batch,
        policy: WritePolicy,
    ) -> Result<Record, RecordError> {
        self.engine.apply(record_id, batch, policy)
    }

    pub fn apply_default(&self, record_id: RecordId, batch: &Batch) -> Result<Record, RecordError> {
        self.apply_batch(record_id, batch, self.default_policy)
    }
}
