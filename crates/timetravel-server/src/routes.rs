// ABOUTME: Route definitions for the timetravel HTTP API.
// ABOUTME: Assembles the v1 and v2 record routes into a single Axum Router with shared state.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api::records;
use crate::app_state::SharedState;

/// Build the complete Axum router with all routes and shared state.
///
/// v1 keeps the original contract: snapshot reads and unconditional writes.
/// v2 adds field history and policy-aware writes.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(records::health))
        .route(
            "/api/v1/records/{id}",
            get(records::get_record).post(records::post_record_v1),
        )
        .route("/api/v2/health", get(records::health))
        .route(
            "/api/v2/records/{id}",
            get(records::get_record).post(records::post_record_v2),
        )
        .route("/api/v2/records/{id}/{key}", get(records::get_field_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use axum::body::Body;
    use http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_returns_ok_on_both_versions() {
        let state: SharedState = Arc::new(AppState::in_memory());
        for uri in ["/api/v1/health", "/api/v2/health"] {
            let app = create_router(Arc::clone(&state));
            let resp = app
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(resp.status(), 200);

            let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
                .await
                .unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["ok"], true);
        }
    }

    #[tokio::test]
    async fn history_route_is_v2_only() {
        let state: SharedState = Arc::new(AppState::in_memory());
        let app = create_router(state);
        let resp = app
            .oneshot(
                Request::get("/api/v1/records/1/color")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }
}
