use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Domain types ────────────────────────────────────────────────

/// One captured request, as staged and later persisted by a sink.
///
/// `day`, `month`, `year` and `hour` are denormalized from `timestamp`
/// (UTC) at capture time. The codec refuses records where they drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub method: String,
    pub path: String,
    /// `-1` when the request carried no usable length.
    pub content_length: i64,
    pub user_agent: String,
    pub day: u32,
    /// 1 = January.
    pub month: u32,
    pub year: i32,
    pub hour: u32,
    pub response_code: u16,
    pub api_key: String,
    pub timestamp: DateTime<Utc>,
    pub api_version: String,
    pub api_name: String,
    pub api_id: String,
    pub org_id: String,
}

impl AnalyticsRecord {
    /// Builds a record with its time components derived from `timestamp`.
    /// Identity fields start empty and the content length unknown.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        response_code: u16,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            content_length: -1,
            user_agent: String::new(),
            day: timestamp.day(),
            month: timestamp.month(),
            year: timestamp.year(),
            hour: timestamp.hour(),
            response_code,
            api_key: String::new(),
            timestamp,
            api_version: String::new(),
            api_name: String::new(),
            api_id: String::new(),
            org_id: String::new(),
        }
    }

    /// True when the denormalized fields match `timestamp`.
    pub fn time_parts_consistent(&self) -> bool {
        let ts = self.timestamp;
        self.year == ts.year()
            && self.month == ts.month()
            && self.day == ts.day()
            && self.hour == ts.hour()
    }
}

// ─── Keying ──────────────────────────────────────────────────────

/// Fresh staging key: hour bucket for debuggability plus a v4 UUID.
/// Two calls never collide, even inside the same hour.
pub fn staging_key(record: &AnalyticsRecord) -> String {
    format!(
        "{:04}{:02}{:02}{:02}-{}",
        record.year,
        record.month,
        record.day,
        record.hour,
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn sample() -> AnalyticsRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 9, 41, 12).unwrap();
        AnalyticsRecord::new("GET", "/v1/widgets", 200, ts)
    }

    #[test]
    fn test_new_derives_time_parts() {
        let r = sample();
        assert_eq!((r.year, r.month, r.day, r.hour), (2024, 3, 7, 9));
        assert_eq!(r.content_length, -1);
        assert!(r.time_parts_consistent());
    }

    #[test]
    fn test_inconsistent_parts_detected() {
        let mut r = sample();
        r.hour = 23;
        assert!(!r.time_parts_consistent());
    }

    #[test]
    fn test_staging_key_has_hour_bucket_prefix() {
        let key = staging_key(&sample());
        assert!(key.starts_with("2024030709-"), "got {key}");
        let suffix = &key["2024030709-".len()..];
        assert!(Uuid::parse_str(suffix).is_ok());
    }

    #[test]
    fn test_staging_keys_unique_within_bucket() {
        let r = sample();
        let keys: HashSet<String> = (0..1_000).map(|_| staging_key(&r)).collect();
        assert_eq!(keys.len(), 1_000);
    }
}
