// ABOUTME: API module containing the HTTP handler functions for the timetravel REST API.
// ABOUTME: Split into record handlers and the error-to-response mapping.

pub mod error;
pub mod records;

pub use error::ApiError;
