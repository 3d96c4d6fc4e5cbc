// ABOUTME: Persistence layer for timetravel: durable implementations of the entry log.
// ABOUTME: Provides a SQLite table backend and a JSONL journal backend with crash recovery.

pub mod journal;
pub mod jsonl;
pub mod recovery;
pub mod sqlite;

pub use journal::JournalLog;
pub use jsonl::{JsonlError, JsonlLog};
pub use recovery::{RecoveryError, recover_journal};
pub use sqlite::{SqliteError, SqliteLog};
