use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

// ─── Codec errors ────────────────────────────────────────────────

/// A record could not be turned into a staging payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The denormalized day/month/year/hour fields disagree with `timestamp`.
    #[error("time components {year}-{month}-{day} {hour}h do not match timestamp {timestamp}")]
    InconsistentTimestamp {
        timestamp: String,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    },
    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// A staged payload could not be read back into a record.
#[derive(Debug, Error)]
#[error("malformed analytics payload: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

// ─── Staging store errors ────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("staging store unavailable: {0}")]
    Unavailable(String),
}

// ─── Capture side ────────────────────────────────────────────────

/// Returned synchronously from `Recorder::record_hit`. The hit is dropped.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("could not encode analytics record: {0}")]
    EncodeFailed(#[from] EncodeError),
    #[error("could not stage analytics record: {0}")]
    StoreWriteFailed(#[from] StoreError),
}

// ─── Drain side ──────────────────────────────────────────────────

/// Everything that can go wrong inside one drain cycle. These are logged by
/// the scheduler and never reach capture callers.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("staging store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("entry {key} could not be decoded: {source}")]
    DecodeFailed {
        key: String,
        #[source]
        source: DecodeError,
    },
    #[error("{sink} sink write failed: {reason}")]
    SinkWriteFailed { sink: &'static str, reason: String },
    #[error("document store connection failed after {attempts} attempt(s): {reason}")]
    ConnectionFailed { attempts: u32, reason: String },
}

impl DrainError {
    pub fn sink_write(sink: &'static str, reason: impl fmt::Display) -> Self {
        Self::SinkWriteFailed {
            sink,
            reason: reason.to_string(),
        }
    }
}

// ─── HTTP-facing error ───────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unprocessable(String),
    Unavailable(String),
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::EncodeFailed(e) => Self::Unprocessable(e.to_string()),
            CaptureError::StoreWriteFailed(e) => Self::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
