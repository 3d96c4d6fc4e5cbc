// ABOUTME: Shared application state for the timetravel HTTP server.
// ABOUTME: Opens the configured entry log backend and wraps it in a RecordService.

use std::sync::Arc;

use thiserror::Error;
use timetravel_core::{EntryLog, MemoryLog, RecordService};
use timetravel_store::{JournalLog, RecoveryError, SqliteError, SqliteLog};

use crate::config::{Backend, TimetravelConfig};

/// Errors that can occur while opening the storage backend.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to open sqlite log: {0}")]
    Sqlite(#[from] SqliteError),

    #[error("failed to recover journal: {0}")]
    Journal(#[from] RecoveryError),
}

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub records: RecordService,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    /// State over a fresh in-memory log with default policies, for tests
    /// and throwaway servers.
    pub fn in_memory() -> Self {
        Self::new(RecordService::new(Arc::new(MemoryLog::new())))
    }

    /// Open the backend named in `config` and apply its write settings.
    pub fn from_config(config: &TimetravelConfig) -> Result<Self, OpenError> {
        let log = open_log(config)?;
        let records = RecordService::new(log)
            .with_default_policy(config.write_policy)
            .with_require_existing(config.require_existing);
        Ok(Self::new(records))
    }
}

/// Open the entry log selected by `config.backend`.
pub fn open_log(config: &TimetravelConfig) -> Result<Arc<dyn EntryLog>, OpenError> {
    let log: Arc<dyn EntryLog> = match config.backend {
        Backend::Sqlite => Arc::new(SqliteLog::open(&config.db_path)?),
        Backend::Journal => Arc::new(JournalLog::open(&config.db_path)?),
        Backend::Memory => {
            tracing::warn!("using in-memory backend; records are lost on exit");
            Arc::new(MemoryLog::new())
        }
    };
    tracing::info!(
        backend = %config.backend,
        path = %config.db_path.display(),
        policy = %config.write_policy,
        require_existing = config.require_existing,
        "entry log ready"
    );
    Ok(log)
}
