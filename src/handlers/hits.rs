use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::record::AnalyticsRecord;
use crate::AppState;

use super::{Accepted, AppError};

// ─── Request types ───────────────────────────────────────────────

/// A hit reported by an upstream gateway. Time components are derived
/// from `timestamp`, which defaults to the time of receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct HitRequest {
    pub method: String,
    pub path: String,
    pub response_code: u16,
    #[serde(default = "unknown_length")]
    pub content_length: i64,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub api_name: String,
    #[serde(default)]
    pub api_id: String,
    #[serde(default)]
    pub org_id: String,
}

fn unknown_length() -> i64 {
    -1
}

impl HitRequest {
    pub fn into_record(self) -> AnalyticsRecord {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let mut record = AnalyticsRecord::new(self.method, self.path, self.response_code, timestamp);
        record.content_length = self.content_length;
        record.user_agent = self.user_agent;
        record.api_key = self.api_key;
        record.api_version = self.api_version;
        record.api_name = self.api_name;
        record.api_id = self.api_id;
        record.org_id = self.org_id;
        record
    }
}

// ─── POST /api/analytics/hits ────────────────────────────────────

pub async fn record_hit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HitRequest>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    if req.method.trim().is_empty() || req.path.trim().is_empty() {
        return Err(AppError::BadRequest("method and path are required".into()));
    }

    let record = req.into_record();
    let key = state.recorder.record_hit(&record).await?;

    Ok((StatusCode::ACCEPTED, Json(Accepted { key })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_into_record_derives_time_parts() {
        let req: HitRequest = serde_json::from_value(serde_json::json!({
            "method": "DELETE",
            "path": "/v1/things/4",
            "response_code": 204,
            "timestamp": "2022-11-30T17:05:00Z",
            "api_name": "Things",
        }))
        .unwrap();

        let record = req.into_record();
        let ts = Utc.with_ymd_and_hms(2022, 11, 30, 17, 5, 0).unwrap();
        assert_eq!(record.timestamp, ts);
        assert_eq!((record.year, record.month, record.day, record.hour), (2022, 11, 30, 17));
        assert_eq!(record.content_length, -1);
        assert_eq!(record.api_name, "Things");
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let req: HitRequest = serde_json::from_value(serde_json::json!({
            "method": "GET",
            "path": "/",
            "response_code": 200,
        }))
        .unwrap();
        let record = req.into_record();
        let now = Utc::now();
        assert_eq!(record.year, now.year());
        assert!(record.hour <= 23 && record.timestamp.hour() == record.hour);
    }
}
