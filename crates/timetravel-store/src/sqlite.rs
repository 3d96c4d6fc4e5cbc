// ABOUTME: SQLite-backed entry log: one row per entry in an AUTOINCREMENT table.
// ABOUTME: Entry ids come from SQLite's own sequence; each call opens its own connection.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use thiserror::Error;
use timetravel_core::{Entry, EntryId, EntryLog, LogError, RecordId};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during SQLite log operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("precondition failed: expected {expected:?}, found {actual:?}")]
    Precondition {
        expected: Option<String>,
        actual: Option<String>,
    },
}

impl From<SqliteError> for LogError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Precondition { expected, actual } => {
                LogError::PreconditionFailed { expected, actual }
            }
            other => LogError::storage(other),
        }
    }
}

/// An entry log stored in a SQLite table.
///
/// There is no shared connection: every operation opens its own, so readers
/// and writers only contend inside SQLite (WAL mode plus a busy timeout).
/// Conditional appends run in an IMMEDIATE transaction, which takes the write
/// lock before reading so the compare and the insert are one step.
#[derive(Debug, Clone)]
pub struct SqliteLog {
    path: PathBuf,
}

impl SqliteLog {
    /// Open or create a log database at the given path, creating the table
    /// and indexes if they are missing.
    pub fn open(path: &Path) -> Result<Self, SqliteError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let log = Self {
            path: path.to_path_buf(),
        };
        let conn = log.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS entries_record_entry
                ON entries (record_id, entry_id);

            CREATE INDEX IF NOT EXISTS entries_record_key_entry
                ON entries (record_id, key, entry_id);",
        )?;

        tracing::info!(
            "opened sqlite log at {} ({} entries)",
            log.path.display(),
            log.count()?
        );
        Ok(log)
    }

    fn connect(&self) -> Result<Connection, SqliteError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Total number of entries in the table.
    pub fn count(&self) -> Result<u64, SqliteError> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// Highest entry id ever stored, if any.
    pub fn highest_entry_id(&self) -> Result<Option<EntryId>, SqliteError> {
        let conn = self.connect()?;
        let max: Option<i64> =
            conn.query_row("SELECT MAX(entry_id) FROM entries", [], |row| row.get(0))?;
        max.map(to_entry_id).transpose()
    }

    fn insert(
        conn: &Connection,
        record_id: RecordId,
        key: &str,
        value: Option<&str>,
    ) -> Result<EntryId, SqliteError> {
        conn.execute(
            "INSERT INTO entries (record_id, key, value) VALUES (?1, ?2, ?3)",
            params![record_id.get(), key, value],
        )?;
        to_entry_id(conn.last_insert_rowid())
    }

    fn try_append(
        &self,
        record_id: RecordId,
        key: &str,
        value: Option<&str>,
    ) -> Result<EntryId, SqliteError> {
        let conn = self.connect()?;
        Self::insert(&conn, record_id, key, value)
    }

    fn try_append_if(
        &self,
        record_id: RecordId,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<EntryId, SqliteError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let actual: Option<String> = tx
            .query_row(
                "SELECT value FROM entries WHERE record_id = ?1 AND key = ?2
                 ORDER BY entry_id DESC LIMIT 1",
                params![record_id.get(), key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();

        if actual.as_deref() != expected {
            // Dropping the transaction rolls it back.
            return Err(SqliteError::Precondition {
                expected: expected.map(str::to_string),
                actual,
            });
        }

        let entry_id = Self::insert(&tx, record_id, key, value)?;
        tx.commit()?;
        Ok(entry_id)
    }

    fn query_entries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Entry>, SqliteError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }

    /// Every entry in the table, ascending by entry id.
    pub fn scan_all(&self) -> Result<Vec<Entry>, SqliteError> {
        self.query_entries(
            "SELECT entry_id, record_id, key, value FROM entries ORDER BY entry_id ASC",
            [],
        )
    }
}

fn to_entry_id(raw: i64) -> Result<EntryId, SqliteError> {
    EntryId::try_from(raw).map_err(|_| SqliteError::CorruptRow(format!("entry_id {}", raw)))
}

/// Decode one row. The outer result is rusqlite's, the inner one rejects
/// values that cannot be valid entries.
fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<Entry, SqliteError>> {
    let entry_id: i64 = row.get(0)?;
    let record_id: i64 = row.get(1)?;
    let key: String = row.get(2)?;
    let value: Option<String> = row.get(3)?;
    Ok(build_entry(entry_id, record_id, key, value))
}

fn build_entry(
    entry_id: i64,
    record_id: i64,
    key: String,
    value: Option<String>,
) -> Result<Entry, SqliteError> {
    Ok(Entry {
        entry_id: to_entry_id(entry_id)?,
        record_id: RecordId::new(record_id)
            .map_err(|_| SqliteError::CorruptRow(format!("record_id {}", record_id)))?,
        key,
        value,
    })
}

impl EntryLog for SqliteLog {
    fn append(
        &self,
        record_id: RecordId,
        key: &str,
        value: Option<&str>,
    ) -> Result<EntryId, LogError> {
        Ok(self.try_append(record_id, key, value)?)
    }

    fn append_if(
        &self,
        record_id: RecordId,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<EntryId, LogError> {
        Ok(self.try_append_if(record_id, key, expected, value)?)
    }

    fn scan_record(&self, record_id: RecordId) -> Result<Vec<Entry>, LogError> {
        Ok(self.query_entries(
            "SELECT entry_id, record_id, key, value FROM entries
             WHERE record_id = ?1 ORDER BY entry_id ASC",
            params![record_id.get()],
        )?)
    }

    fn scan_field(&self, record_id: RecordId, key: &str) -> Result<Vec<Entry>, LogError> {
        Ok(self.query_entries(
            "SELECT entry_id, record_id, key, value FROM entries
             WHERE record_id = ?1 AND key = ?2 ORDER BY entry_id ASC",
            params![record_id.get(), key],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use timetravel_core::resolve::{history, resolve};
    use timetravel_core::{Batch, FieldUpdate, MutationEngine, RecordError, WritePolicy};

    fn rid(id: i64) -> RecordId {
        RecordId::new(id).unwrap()
    }

    fn open_temp() -> (TempDir, SqliteLog) {
        let dir = TempDir::new().unwrap();
        let log = SqliteLog::open(&dir.path().join("records.db")).unwrap();
        (dir, log)
    }

    #[test]
    fn sqlite_append_and_resolve() {
        let (_dir, log) = open_temp();
        assert_eq!(log.append(rid(5), "color", Some("red")).unwrap(), 1);
        assert_eq!(log.append(rid(5), "color", Some("blue")).unwrap(), 2);

        let record = resolve(&log, rid(5)).unwrap();
        assert_eq!(record.data.get("color").map(String::as_str), Some("blue"));

        let hist = history(&log, rid(5), "color").unwrap();
        let values: Vec<_> = hist
            .history
            .iter()
            .map(|v| (v.entry_id, v.value.as_deref()))
            .collect();
        assert_eq!(values, vec![(1, Some("red")), (2, Some("blue"))]);
    }

    #[test]
    fn sqlite_deletion_marker_is_null_value() {
        let (_dir, log) = open_temp();
        log.append(rid(7), "a", Some("1")).unwrap();
        log.append(rid(7), "b", Some("2")).unwrap();
        log.append(rid(7), "a", None).unwrap();

        let record = resolve(&log, rid(7)).unwrap();
        assert_eq!(record.data.len(), 1);
        assert_eq!(record.data.get("b").map(String::as_str), Some("2"));

        let raw = log.scan_field(rid(7), "a").unwrap();
        assert_eq!(raw.len(), 2);
        assert!(raw[1].is_deletion());
    }

    #[test]
    fn sqlite_ids_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");
        {
            let log = SqliteLog::open(&path).unwrap();
            log.append(rid(1), "k", Some("v1")).unwrap();
            log.append(rid(1), "k", Some("v2")).unwrap();
        }

        let log = SqliteLog::open(&path).unwrap();
        assert_eq!(log.highest_entry_id().unwrap(), Some(2));
        assert_eq!(log.append(rid(1), "k", Some("v3")).unwrap(), 3);
        assert_eq!(log.count().unwrap(), 3);
        assert_eq!(log.scan_all().unwrap().len(), 3);
    }

    #[test]
    fn sqlite_empty_log_has_no_highest_id() {
        let (_dir, log) = open_temp();
        assert_eq!(log.highest_entry_id().unwrap(), None);
        assert!(matches!(
            resolve(&log, rid(1)),
            Err(RecordError::RecordNotFound(_))
        ));
    }

    #[test]
    fn sqlite_append_if_rolls_back_on_mismatch() {
        let (_dir, log) = open_temp();
        log.append(rid(1), "color", Some("red")).unwrap();

        let err = log
            .append_if(rid(1), "color", Some("blue"), Some("green"))
            .unwrap_err();
        assert!(matches!(err, LogError::PreconditionFailed { .. }));
        assert_eq!(log.count().unwrap(), 1);

        assert_eq!(
            log.append_if(rid(1), "color", Some("red"), Some("green"))
                .unwrap(),
            2
        );
        assert_eq!(log.append_if(rid(1), "new", None, Some("x")).unwrap(), 3);
    }

    #[test]
    fn sqlite_concurrent_appends_get_distinct_ids() {
        let (_dir, log) = open_temp();
        let n = 16;
        let ids: Vec<EntryId> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..n)
                .map(|i| {
                    let log = log.clone();
                    s.spawn(move || log.append(rid(3), &format!("k{}", i), Some("v")).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), n);
        assert_eq!(resolve(&log, rid(3)).unwrap().data.len(), n);
    }

    #[test]
    fn sqlite_concurrent_cas_has_one_winner() {
        let (_dir, log) = open_temp();
        log.append(rid(1), "slot", Some("free")).unwrap();
        let engine = MutationEngine::new(Arc::new(log.clone()));

        let wins = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for i in 0..8 {
                let engine = engine.clone();
                let wins = &wins;
                s.spawn(move || {
                    let mut batch = Batch::new();
                    batch.insert(
                        "slot".to_string(),
                        FieldUpdate::set(format!("taken-{}", i)).expecting("free"),
                    );
                    if engine
                        .apply(rid(1), &batch, WritePolicy::CompareAndSet)
                        .is_ok()
                    {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn sqlite_unreachable_medium_is_storage_io() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");
        let log = SqliteLog::open(&path).unwrap();
        drop(dir);

        // With the directory gone a fresh connection cannot open the file.
        let err = log.append(rid(1), "k", Some("v")).unwrap_err();
        assert!(matches!(err, LogError::StorageIo(_)));
    }
}
