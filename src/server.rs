use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::capture;
use crate::AppState;

/// Builds the full Axum `Router`: analytics endpoints plus hit capture on
/// every other route.
pub fn create_router(state: Arc<AppState>) -> Router {
    let recorder = state.recorder.clone();

    Router::new()
        // ── Capture ─────────────────────────────────────────────
        .route("/api/analytics/hits", post(handlers::hits::record_hit))
        // ── Drain control ───────────────────────────────────────
        .route("/api/analytics/flush", post(handlers::control::flush_now))
        // ── Metrics ─────────────────────────────────────────────
        .route("/api/analytics/stats", get(stream::get_stats))
        .route("/api/analytics/stream", get(stream::stats_stream))
        // ── Liveness ────────────────────────────────────────────
        .route("/health", get(handlers::control::health))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(recorder, capture::capture_hits))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DrainMetrics;
    use crate::recorder::Recorder;
    use crate::scheduler::FlushHandle;
    use crate::store::MemoryStagingStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: Arc<MemoryStagingStore>) -> Router {
        create_router(Arc::new(AppState {
            recorder: Recorder::new(store),
            metrics: Arc::new(DrainMetrics::new()),
            flush: FlushHandle::default(),
        }))
    }

    #[tokio::test]
    async fn test_hit_endpoint_stages_record() {
        let store = Arc::new(MemoryStagingStore::new());
        let body = serde_json::json!({
            "method": "GET",
            "path": "/v2/orders",
            "response_code": 200,
            "api_name": "Orders",
        });

        let response = app(store.clone())
            .oneshot(
                Request::post("/api/analytics/hits")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        // Own endpoints are not captured, so exactly one record is staged
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_hit_endpoint_rejects_empty_path() {
        let store = Arc::new(MemoryStagingStore::new());
        let body = serde_json::json!({ "method": "GET", "path": " ", "response_code": 200 });

        let response = app(store.clone())
            .oneshot(
                Request::post("/api/analytics/hits")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_other_routes_are_captured() {
        let store = Arc::new(MemoryStagingStore::new());

        let response = app(store.clone())
            .oneshot(
                Request::get("/health")
                    .header("user-agent", "probe/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Capture runs on a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;
        let payload = store.get(&store.keys()[0]).unwrap();
        let record = crate::codec::decode(&payload).unwrap();
        assert_eq!(record.path, "/health");
        assert_eq!(record.user_agent, "probe/1");
        assert_eq!(record.response_code, 200);
    }
}
