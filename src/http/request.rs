//! Request classification.
//!
//! # Responsibilities
//! - Decide whether a request opted into deferred handling
//! - Extract the declared body length for size enforcement
//!
//! # Design Decisions
//! - Only the exact value `respond-async` on the first `Prefer` header
//!   marks a request as deferred; anything else is forwarded synchronously

use axum::http::{header, HeaderMap, HeaderName};

/// Header carrying the deferral marker.
pub const PREFER: HeaderName = HeaderName::from_static("prefer");

/// Marker value requesting fire-and-forget handling.
pub const RESPOND_ASYNC: &str = "respond-async";

/// Header echoed on every response for log correlation.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Whether the caller asked for deferred handling.
pub fn is_deferred(headers: &HeaderMap) -> bool {
    headers
        .get(PREFER)
        .is_some_and(|value| value.as_bytes() == RESPOND_ASYNC.as_bytes())
}

/// The `Content-Length` the caller declared, if any and well-formed
/// (ASCII digits only).
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(header::CONTENT_LENGTH)?.to_str().ok()?.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// The request ID assigned by the request-id layer, for logging.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_classification() {
        assert!(is_deferred(&headers(&[("prefer", "respond-async")])));
        assert!(is_deferred(&headers(&[("Prefer", "respond-async")])));

        assert!(!is_deferred(&headers(&[])));
        assert!(!is_deferred(&headers(&[("prefer", "return=minimal")])));
        assert!(!is_deferred(&headers(&[("prefer", "respond-async, wait=10")])));
        assert!(!is_deferred(&headers(&[("prefer", "Respond-Async")])));
        assert!(!is_deferred(&headers(&[("x-prefer", "respond-async")])));
    }

    #[test]
    fn test_declared_length() {
        assert_eq!(declared_length(&headers(&[("content-length", "42")])), Some(42));
        assert_eq!(declared_length(&headers(&[("content-length", "abc")])), None);
        assert_eq!(declared_length(&headers(&[("content-length", "+5")])), None);
        assert_eq!(declared_length(&headers(&[("content-length", "-1")])), None);
        assert_eq!(declared_length(&headers(&[])), None);
    }

    #[test]
    fn test_request_id_fallback() {
        assert_eq!(request_id(&headers(&[("x-request-id", "abc")])), "abc");
        assert_eq!(request_id(&headers(&[])), "unknown");
    }
}
