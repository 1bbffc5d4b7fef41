use axum::{extract::State, Json};
use std::sync::Arc;

use crate::AppState;

use super::ControlStatus;

// ─── POST /api/analytics/flush ───────────────────────────────────

/// Ask every drain scheduler for an immediate cycle. Cycles stay
/// sequential per sink: a request landing mid-drain queues one more.
pub async fn flush_now(State(state): State<Arc<AppState>>) -> Json<ControlStatus> {
    let woken = state.flush.flush_now();
    tracing::info!(schedulers = woken, "Manual flush requested");

    Json(ControlStatus {
        ok: woken > 0,
        message: if woken > 0 {
            format!("Flush requested for {woken} sink(s)")
        } else {
            "No drain schedulers running".into()
        },
    })
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health() -> Json<ControlStatus> {
    Json(ControlStatus {
        ok: true,
        message: "ok".into(),
    })
}
