// ABOUTME: Configuration loading and validation for the timetravel server.
// ABOUTME: Reads TIMETRAVEL_* environment variables and applies defaults.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use timetravel_core::WritePolicy;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TIMETRAVEL_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("TIMETRAVEL_BACKEND must be one of sqlite, journal, memory; got {0:?}")]
    InvalidBackend(String),

    #[error("TIMETRAVEL_WRITE_POLICY must be append or cas; got {0:?}")]
    InvalidPolicy(String),
}

/// Which entry log implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Journal,
    Memory,
}

impl Backend {
    /// Storage path used when TIMETRAVEL_DB_PATH is not set.
    pub fn default_path(self) -> PathBuf {
        match self {
            Backend::Sqlite => PathBuf::from("./records.db"),
            Backend::Journal => PathBuf::from("./records.jsonl"),
            Backend::Memory => PathBuf::new(),
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "journal" | "jsonl" => Ok(Backend::Journal),
            "memory" => Ok(Backend::Memory),
            _ => Err(ConfigError::InvalidBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Sqlite => "sqlite",
            Backend::Journal => "journal",
            Backend::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TimetravelConfig {
    pub bind: SocketAddr,
    pub backend: Backend,
    pub db_path: PathBuf,
    pub write_policy: WritePolicy,
    pub require_existing: bool,
}

impl TimetravelConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - TIMETRAVEL_BIND: socket address to bind (default: 127.0.0.1:8000)
    /// - TIMETRAVEL_BACKEND: sqlite, journal or memory (default: sqlite)
    /// - TIMETRAVEL_DB_PATH: storage path (default: ./records.db or ./records.jsonl)
    /// - TIMETRAVEL_WRITE_POLICY: default v2 write policy, append or cas (default: append)
    /// - TIMETRAVEL_REQUIRE_EXISTING: reject writes that would create a record (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_str =
            std::env::var("TIMETRAVEL_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let backend = match std::env::var("TIMETRAVEL_BACKEND") {
            Ok(v) if !v.is_empty() => v.parse()?,
            _ => Backend::Sqlite,
        };

        let db_path = std::env::var("TIMETRAVEL_DB_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| backend.default_path());

        let write_policy = match std::env::var("TIMETRAVEL_WRITE_POLICY") {
            Ok(v) if !v.is_empty() => v
                .parse::<WritePolicy>()
                .map_err(ConfigError::InvalidPolicy)?,
            _ => WritePolicy::AppendAll,
        };

        let require_existing = std::env::var("TIMETRAVEL_REQUIRE_EXISTING")
            .map(|v| v == "true" || v == "1" || v == "yes")
            .unwrap_or(false);

        Ok(Self {
            bind,
            backend,
            db_path,
            write_policy,
            require_existing,
        })
    }
}
