// ABOUTME: HTTP server for timetravel, exposing record snapshots, field history, and batch writes.
// ABOUTME: Uses Axum with a shared RecordService over the configured entry log backend.

pub mod api;
pub mod app_state;
pub mod config;
pub mod routes;

pub use app_state::{AppState, OpenError, SharedState, open_log};
pub use config::{Backend, ConfigError, TimetravelConfig};
pub use routes::create_router;
