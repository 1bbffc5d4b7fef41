pub mod control;
pub mod hits;

use serde::Serialize;

pub use crate::error::AppError;

// ─── Shared response envelope ────────────────────────────────────

/// Acknowledgement for a staged hit.
#[derive(Debug, Clone, Serialize)]
pub struct Accepted {
    /// Staging key the hit was written under.
    pub key: String,
}

/// Reply for control endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ControlStatus {
    pub ok: bool,
    pub message: String,
}
