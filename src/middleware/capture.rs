use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::record::AnalyticsRecord;
use crate::recorder::Recorder;

/// Paths under this prefix are the analytics service itself and are not
/// recorded as hits.
const OWN_PREFIX: &str = "/api/analytics";

/// Tower-compatible middleware that records every request as an
/// `AnalyticsRecord` once the response status is known.
///
/// The staging write happens on a spawned task, so the response never
/// waits on the store. Capture failures are logged and the hit dropped.
pub async fn capture_hits(State(recorder): State<Recorder>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    if path.starts_with(OWN_PREFIX) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let headers = req.headers().clone();
    let timestamp = Utc::now();

    let response = next.run(req).await;

    let record = build_record(method, path, &headers, response.status().as_u16(), timestamp);
    tokio::spawn(async move {
        if let Err(e) = recorder.record_hit(&record).await {
            tracing::warn!(error = %e, path = %record.path, "Dropped analytics hit");
        }
    });

    response
}

fn build_record(
    method: String,
    path: String,
    headers: &HeaderMap,
    status: u16,
    timestamp: chrono::DateTime<Utc>,
) -> AnalyticsRecord {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    };

    let mut record = AnalyticsRecord::new(method, path, status, timestamp);
    record.content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1);
    record.user_agent = text(header::USER_AGENT.as_str());
    record.api_key = text("x-api-key");
    record.api_version = text("x-api-version");
    record.api_name = text("x-api-name");
    record.api_id = text("x-api-id");
    record.org_id = text("x-org-id");
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_build_record_reads_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("512"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("probe/2"));
        headers.insert("x-api-key", HeaderValue::from_static("k1"));
        headers.insert("x-api-name", HeaderValue::from_static("Catalog"));
        headers.insert("x-org-id", HeaderValue::from_static("o1"));

        let r = build_record("PUT".into(), "/catalog/1".into(), &headers, 409, Utc::now());

        assert_eq!(r.content_length, 512);
        assert_eq!(r.user_agent, "probe/2");
        assert_eq!(r.api_key, "k1");
        assert_eq!(r.api_name, "Catalog");
        assert_eq!(r.org_id, "o1");
        assert_eq!(r.api_version, "");
        assert_eq!(r.response_code, 409);
        assert!(r.time_parts_consistent());
    }

    #[test]
    fn test_missing_or_bad_length_is_unknown() {
        let mut headers = HeaderMap::new();
        let r = build_record("GET".into(), "/".into(), &headers, 200, Utc::now());
        assert_eq!(r.content_length, -1);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        let r = build_record("GET".into(), "/".into(), &headers, 200, Utc::now());
        assert_eq!(r.content_length, -1);
    }
}
