// ABOUTME: Entry point for the timetravel binary.
// ABOUTME: Loads .env and config, initializes tracing, opens the entry log, and serves HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use timetravel_core::WritePolicy;
use timetravel_server::{AppState, Backend, TimetravelConfig, create_router};

/// Command-line overrides. Anything not given falls back to TIMETRAVEL_* env vars.
#[derive(Debug, Parser)]
#[command(name = "timetravel")]
#[command(about = "Versioned record store with field history")]
struct Cli {
    /// Socket address to bind.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Storage backend: sqlite, journal or memory.
    #[arg(long)]
    backend: Option<Backend>,

    /// Path of the sqlite database or journal file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Default write policy for v2 writes: append or cas.
    #[arg(long)]
    policy: Option<WritePolicy>,

    /// Reject writes to records that have no entries yet.
    #[arg(long)]
    require_existing: bool,
}

impl Cli {
    fn apply(self, mut config: TimetravelConfig) -> TimetravelConfig {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(backend) = self.backend {
            // A backend switch without an explicit path moves to that backend's default file.
            if backend != config.backend && self.db_path.is_none() {
                config.db_path = backend.default_path();
            }
            config.backend = backend;
        }
        if let Some(path) = self.db_path {
            config.db_path = path;
        }
        if let Some(policy) = self.policy {
            config.write_policy = policy;
        }
        config.require_existing |= self.require_existing;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timetravel=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.apply(TimetravelConfig::from_env()?);

    let state = AppState::from_config(&config).context("failed to open entry log")?;
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
