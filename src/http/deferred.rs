//! Deferred request capture.
//!
//! # Data Flow
//! ```text
//! Request<Body> with Prefer: respond-async
//!     → length checks (411 when undeclared, 500 when over the limit)
//!     → bounded body read
//!     → codec::encode → Envelope { id, request }
//!     → QueueClient::append
//!     → 202 Accepted
//! ```
//!
//! # Limitations
//! - The envelope carries the captured request as a JSON string, so a
//!   request whose head or body is not valid UTF-8 (binary uploads, for
//!   instance) cannot be deferred and is answered with 500

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use hyper::body::Body as HttpBody;
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::http::request::declared_length;
use crate::http::server::AppState;
use crate::queue::{Envelope, QueueError};

/// Why a deferred request was not accepted.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request has a body but no declared length")]
    LengthRequired,

    #[error("body size exceeds limit of {} MB", megabytes(.limit))]
    TooLarge { limit: u64 },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / 1_000_000.0
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            DispatchError::BodyRead(_) => StatusCode::BAD_REQUEST,
            DispatchError::TooLarge { .. }
            | DispatchError::Encode(_)
            | DispatchError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let message = match &self {
            DispatchError::LengthRequired => "length required".to_string(),
            DispatchError::TooLarge { .. } => self.to_string(),
            DispatchError::BodyRead(_) => "failed to read request body".to_string(),
            DispatchError::Encode(_) => "failed to capture request".to_string(),
            DispatchError::Queue(_) => "failed to enqueue request".to_string(),
        };
        (self.status(), message).into_response()
    }
}

/// Capture `request` and append it to the queue. Returns the envelope id.
pub async fn enqueue(state: &AppState, request: Request<Body>) -> Result<String, DispatchError> {
    let limit = state.size_limit;
    let declared = declared_length(request.headers());
    let (mut parts, body) = request.into_parts();

    match declared {
        None if !body.is_end_stream() => return Err(DispatchError::LengthRequired),
        Some(len) if len > limit => return Err(DispatchError::TooLarge { limit }),
        _ => {}
    }

    let body = read_limited(body, limit).await?;

    if let Some(destination) = &state.destination {
        let host = HeaderValue::from_str(destination.as_str())
            .map_err(|_| CodecError::Encode("destination is not a valid Host value"))?;
        parts.headers.insert(header::HOST, host);
    }

    let payload = codec::encode(&Request::from_parts(parts, body))?;
    let envelope = Envelope::new(state.ids.next_id(), payload)?;

    state.queue.append(&state.stream, &envelope).await?;
    Ok(envelope.id)
}

/// Buffer the body, failing as soon as it grows past `limit` bytes.
async fn read_limited(body: Body, limit: u64) -> Result<Bytes, DispatchError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DispatchError::BodyRead(e.to_string()))?;
        if (buf.len() + chunk.len()) as u64 > limit {
            return Err(DispatchError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_message_in_megabytes() {
        let err = DispatchError::TooLarge { limit: 6_000_000 };
        assert_eq!(err.to_string(), "body size exceeds limit of 6 MB");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = DispatchError::TooLarge { limit: 1_500_000 };
        assert_eq!(err.to_string(), "body size exceeds limit of 1.5 MB");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DispatchError::LengthRequired.status(), StatusCode::LENGTH_REQUIRED);
        assert_eq!(DispatchError::BodyRead("reset".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DispatchError::Queue(QueueError::Unavailable("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DispatchError::Encode(CodecError::Encode("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_read_limited_stops_past_limit() {
        let ok = read_limited(Body::from("12345"), 5).await.unwrap();
        assert_eq!(&ok[..], b"12345");

        let err = read_limited(Body::from("123456"), 5).await.unwrap_err();
        assert!(matches!(err, DispatchError::TooLarge { limit: 5 }));
    }
}
