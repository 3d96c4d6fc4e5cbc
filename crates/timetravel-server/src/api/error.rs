// ABOUTME: Maps record errors and request rejections onto HTTP status codes.
// ABOUTME: Every error response body has the shape {"error": "..."}.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use timetravel_core::RecordError;

/// Error wrapper for converting record errors to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    Record(RecordError),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Record(err) => match err.root() {
                RecordError::InvalidId(_) => StatusCode::BAD_REQUEST,
                RecordError::RecordNotFound(_) | RecordError::FieldNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                RecordError::Conflict { .. } => StatusCode::CONFLICT,
                RecordError::StorageIo(_) | RecordError::BatchAborted { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Record(err) => err.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
        };

        if status.is_server_error() {
            tracing::error!(%status, "{}", message);
        } else {
            tracing::debug!(%status, "{}", message);
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        ApiError::Record(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid input; could not parse json: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
