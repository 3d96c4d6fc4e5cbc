// ABOUTME: Record API handlers: snapshot reads, field history reads, and batch writes.
// ABOUTME: Storage calls run on the blocking pool since every backend does synchronous IO.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use timetravel_core::{
    Batch, FieldHistory, Record, RecordError, RecordId, RecordService, WritePolicy,
    batch_from_values,
};

use crate::api::error::ApiError;
use crate::app_state::SharedState;

/// Query parameters accepted by the v2 write endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WriteParams {
    pub policy: Option<WritePolicy>,
}

/// Run a service call on the blocking pool.
async fn run_blocking<T, F>(state: &SharedState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&RecordService) -> Result<T, RecordError> + Send + 'static,
    T: Send + 'static,
{
    let records = state.records.clone();
    tokio::task::spawn_blocking(move || f(&records))
        .await
        .map_err(|e| ApiError::Internal(format!("storage task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// GET /api/v{1,2}/records/{id} - Current fields of a record.
pub async fn get_record(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let record_id = id.parse::<RecordId>()?;
    let record = run_blocking(&state, move |svc| svc.get_snapshot(record_id)).await?;
    Ok(Json(record))
}

/// GET /api/v2/records/{id}/{key} - Every value ever written for one field.
pub async fn get_field_history(
    State(state): State<SharedState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<FieldHistory>, ApiError> {
    let record_id = id.parse::<RecordId>()?;
    let history = run_blocking(&state, move |svc| svc.get_history(record_id, &key)).await?;
    Ok(Json(history))
}

/// POST /api/v1/records/{id} - Plain `{key: value|null}` body, always appended
/// unconditionally. Creates the record if it does not exist yet.
pub async fn post_record_v1(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<BTreeMap<String, Option<String>>>, JsonRejection>,
) -> Result<Json<Record>, ApiError> {
    let record_id = id.parse::<RecordId>()?;
    let Json(values) = body?;
    let batch = batch_from_values(values);

    let record = run_blocking(&state, move |svc| {
        svc.apply_batch(record_id, &batch, WritePolicy::AppendAll)
    })
    .await?;
    Ok(Json(record))
}

/// POST /api/v2/records/{id}?policy=append|cas - Body maps each key to
/// `{"value": ..., "prev_value": ...}`. Without `policy` the server default applies.
pub async fn post_record_v2(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    params: Result<Query<WriteParams>, QueryRejection>,
    body: Result<Json<Batch>, JsonRejection>,
) -> Result<Json<Record>, ApiError> {
    let record_id = id.parse::<RecordId>()?;
    let Query(params) = params?;
    let Json(batch) = body?;
    let policy = params
        .policy
        .unwrap_or_else(|| state.records.default_policy());

    let record =
        run_blocking(&state, move |svc| svc.apply_batch(record_id, &batch, policy)).await?;
    Ok(Json(record))
}

/// GET /api/v{1,2}/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
