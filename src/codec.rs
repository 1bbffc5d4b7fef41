//! Staging payload codec.
//!
//! Records are staged as JSON. The format keeps every field, including
//! nanosecond timestamps, so `decode(encode(r)) == r`.

use crate::error::{DecodeError, EncodeError};
use crate::record::AnalyticsRecord;

/// Serialize a record into an opaque staging payload.
///
/// Rejects records whose denormalized time fields disagree with the
/// timestamp; nothing is produced in that case.
pub fn encode(record: &AnalyticsRecord) -> Result<Vec<u8>, EncodeError> {
    if !record.time_parts_consistent() {
        return Err(EncodeError::InconsistentTimestamp {
            timestamp: record.timestamp.to_rfc3339(),
            year: record.year,
            month: record.month,
            day: record.day,
            hour: record.hour,
        });
    }

    serde_json::to_vec(record).map_err(EncodeError::Serialize)
}

/// Parse a staging payload back into a record.
pub fn decode(payload: &[u8]) -> Result<AnalyticsRecord, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn full_record() -> AnalyticsRecord {
        let ts = Utc
            .with_ymd_and_hms(2023, 12, 31, 23, 59, 59)
            .unwrap()
            .checked_add_signed(chrono::Duration::nanoseconds(123_456_789))
            .unwrap();
        let mut r = AnalyticsRecord::new("POST", "/orders?id=1,2", 201, ts);
        r.content_length = 4096;
        r.user_agent = "curl/8.4.0, \"quoted\"".into();
        r.api_key = "key-123".into();
        r.api_version = "v2".into();
        r.api_name = "Orders".into();
        r.api_id = "api-7".into();
        r.org_id = "org-9".into();
        r
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let r = full_record();
        let payload = encode(&r).unwrap();
        let back = decode(&payload).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.timestamp.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_round_trip_unknown_length() {
        let mut r = full_record();
        r.content_length = -1;
        r.user_agent.clear();
        assert_eq!(decode(&encode(&r).unwrap()).unwrap(), r);
    }

    #[test]
    fn test_encode_rejects_drifted_time_parts() {
        let mut r = full_record();
        r.month = 13;
        let err = encode(&r).unwrap_err();
        assert!(matches!(err, EncodeError::InconsistentTimestamp { month: 13, .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"\x93\x01\x02").is_err());
        assert!(decode(br#"{"method":"GET"}"#).is_err());
    }
}
