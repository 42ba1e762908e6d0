//! Push-mode receiver for CloudEvents carrying envelopes.
//!
//! # Content Modes
//! ```text
//! binary:      ce-* headers, body = envelope JSON
//! structured:  content-type: application/cloudevents+json
//!              body = { "specversion": ..., "data": <envelope> }
//!              where data is a JSON object or a JSON string
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::lifecycle::shutdown::ShutdownSignal;
use crate::queue::Envelope;
use crate::replay::Replayer;

const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

pub fn router(replayer: Arc<Replayer>) -> Router {
    Router::new()
        .route("/", post(receive))
        .with_state(replayer)
        .layer(TraceLayer::new_for_http())
}

/// Serve the push receiver until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    replayer: Arc<Replayer>,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Push receiver starting");
    axum::serve(listener, router(replayer))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;
    tracing::info!("Push receiver stopped");
    Ok(())
}

async fn receive(State(replayer): State<Arc<Replayer>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let event_id = headers
        .get("ce-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    match envelope_from_event(&headers, &body) {
        Ok(envelope) => {
            tracing::debug!(event_id = %event_id, envelope_id = %envelope.id, "Event received");
            replayer.handle(&envelope).await;
            StatusCode::OK
        }
        Err(reason) => {
            tracing::warn!(event_id = %event_id, reason = %reason, "Event does not carry an envelope");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Extract the envelope from either CloudEvents content mode.
pub fn envelope_from_event(headers: &HeaderMap, body: &[u8]) -> Result<Envelope, String> {
    let structured = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with(STRUCTURED_CONTENT_TYPE));

    if !structured {
        return Envelope::from_json(body).map_err(|e| e.to_string());
    }

    let mut event: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    match event.get_mut("data").map(Value::take) {
        Some(Value::String(data)) => Envelope::from_json(data.as_bytes()).map_err(|e| e.to_string()),
        Some(data @ Value::Object(_)) => serde_json::from_value(data).map_err(|e| e.to_string()),
        Some(_) => Err("event data is neither an object nor a string".into()),
        None => Err("event has no data".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const ENVELOPE: &str = r#"{"id":"e1","request":"GET / HTTP/1.1\r\nhost: h\r\n\r\n"}"#;

    fn structured() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/cloudevents+json; charset=utf-8"),
        );
        headers
    }

    #[test]
    fn test_binary_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("ce-id", HeaderValue::from_static("evt-1"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let envelope = envelope_from_event(&headers, ENVELOPE.as_bytes()).unwrap();
        assert_eq!(envelope.id, "e1");
    }

    #[test]
    fn test_structured_mode_object_data() {
        let body = format!(r#"{{"specversion":"1.0","id":"evt-1","type":"t","source":"s","data":{ENVELOPE}}}"#);
        let envelope = envelope_from_event(&structured(), body.as_bytes()).unwrap();
        assert_eq!(envelope.id, "e1");
    }

    #[test]
    fn test_structured_mode_string_data() {
        let body = serde_json::json!({ "specversion": "1.0", "data": ENVELOPE }).to_string();
        let envelope = envelope_from_event(&structured(), body.as_bytes()).unwrap();
        assert!(envelope.payload.starts_with("GET / HTTP/1.1"));
    }

    #[test]
    fn test_rejects_non_envelopes() {
        assert!(envelope_from_event(&HeaderMap::new(), b"not json").is_err());
        assert!(envelope_from_event(&structured(), br#"{"specversion":"1.0"}"#).is_err());
        assert!(envelope_from_event(&structured(), br#"{"data":42}"#).is_err());
    }
}
