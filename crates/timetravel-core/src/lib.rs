// ABOUTME: Core library for timetravel: versioned records built on an append-only entry log.
// ABOUTME: Defines entries, the log contract, id allocation, resolvers, and the mutation engine.

pub mod allocator;
pub mod entry;
pub mod error;
pub mod log;
pub mod memory;
pub mod mutation;
pub mod resolve;
pub mod service;

pub use allocator::EntryIdAllocator;
pub use entry::{Entry, EntryId, FieldHistory, FieldVersion, Record, RecordId};
pub use error::{BoxError, LogError, RecordError};
pub use log::EntryLog;
pub use memory::MemoryLog;
pub use mutation::{Batch, FieldUpdate, MutationEngine, WritePolicy, batch_from_values};
pub use service::RecordService;
