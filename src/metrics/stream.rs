use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::DrainStatsSnapshot;
use crate::AppState;

// ─── GET /api/analytics/stats ────────────────────────────────────
/// Single JSON snapshot of drain statistics.

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<DrainStatsSnapshot> {
    Json(state.metrics.snapshot())
}

// ─── GET /api/analytics/stream ───────────────────────────────────
/// Server-Sent Events endpoint pushing a `DrainStatsSnapshot` every 500 ms.

pub async fn stats_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.metrics.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
