//! Buffered response model and conversions to stored snapshots.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use shellcache_core::CachedResponse;

/// Visibility class of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    /// Cross-origin response the origin shared via CORS.
    Cors,
    /// Cross-origin `no-cors` response: status and body are not inspectable.
    Opaque,
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl Response {
    pub fn new(url: impl Into<String>, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), status, headers: HeaderMap::new(), body: body.into(), kind: ResponseKind::Basic }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Synthesized answer for a network-first request with no network and no
    /// stored copy: 503 with `{"error": .., "url": ..}`.
    pub fn service_unavailable(url: &str) -> Self {
        let body = serde_json::json!({
            "error": "Network request failed and no cached response is available",
            "url": url,
        });
        Self::new(url, StatusCode::SERVICE_UNAVAILABLE, body.to_string())
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    /// Success status, or opaque (its real status can't be checked, so it is
    /// stored speculatively).
    pub fn is_cacheable(&self) -> bool {
        self.is_ok() || self.is_opaque()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Snapshot for the store. Non-UTF-8 header values are dropped.
    pub fn to_cached(&self) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        CachedResponse {
            url: self.url.clone(),
            status: self.status.as_u16(),
            status_text: self.status.canonical_reason().map(str::to_string),
            headers,
            body: self.body.to_vec(),
            opaque: self.is_opaque(),
        }
    }

    /// Replay a stored snapshot. Headers that no longer parse are skipped.
    pub fn from_cached(cached: CachedResponse) -> Self {
        let mut headers = HeaderMap::with_capacity(cached.headers.len());
        for (name, value) in &cached.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(url = %cached.url, header = %name, "skipping unparsable stored header"),
            }
        }

        Self {
            url: cached.url,
            status: StatusCode::from_u16(cached.status).unwrap_or_default(),
            headers,
            body: Bytes::from(cached.body),
            kind: if cached.opaque { ResponseKind::Opaque } else { ResponseKind::Basic },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheable_rules() {
        let ok = Response::new("https://example.com/", StatusCode::OK, "x");
        let missing = Response::new("https://example.com/", StatusCode::NOT_FOUND, "");
        let opaque = Response::new("https://cdn.example.com/", StatusCode::NOT_FOUND, "").with_kind(ResponseKind::Opaque);

        assert!(ok.is_cacheable());
        assert!(!missing.is_cacheable());
        assert!(opaque.is_cacheable());
    }

    #[test]
    fn test_service_unavailable_body() {
        let response = Response::service_unavailable("https://rebrickable.com/api/v3/lego/sets/1/");
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.content_type(), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["url"], "https://rebrickable.com/api/v3/lego/sets/1/");
        assert!(body["error"].as_str().unwrap().contains("Network request failed"));
    }

    #[test]
    fn test_snapshot_preserves_fields() {
        let response = Response::new("https://example.com/api/sets/1", StatusCode::CREATED, r#"{"id":1}"#)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let cached = response.to_cached();
        assert_eq!(cached.status, 201);
        assert_eq!(cached.status_text.as_deref(), Some("Created"));
        assert_eq!(cached.header("content-type"), Some("application/json"));

        let replayed = Response::from_cached(cached);
        assert_eq!(replayed.status, StatusCode::CREATED);
        assert_eq!(replayed.body, response.body);
        assert_eq!(replayed.content_type(), Some("application/json"));
        assert_eq!(replayed.kind, ResponseKind::Basic);
    }

    #[test]
    fn test_from_cached_skips_bad_headers() {
        let cached = CachedResponse {
            url: "https://example.com/".into(),
            status: 200,
            status_text: None,
            headers: vec![("bad header".into(), "x".into()), ("x-ok".into(), "1".into())],
            body: Vec::new(),
            opaque: true,
        };

        let response = Response::from_cached(cached);
        assert_eq!(response.headers.len(), 1);
        assert!(response.is_opaque());
    }
}
