//! Request capture codec.
//!
//! # Data Flow
//! ```text
//! Deferred request (Request<Bytes>)
//!     → encode.rs (request-line + headers + blank line + body)
//!     → Bytes stored in the queue envelope
//!
//! Queue envelope payload
//!     → decode.rs (parse textual HTTP/1.1 request)
//!     → DecodedRequest (origin-form target, not yet addressed)
//!     → into_addressed() → Request<Bytes> ready for the HTTP client
//! ```
//!
//! # Design Decisions
//! - Pure functions, no I/O: the codec never touches sockets or the queue
//! - The body is fully buffered, so framing is normalized to Content-Length
//! - A decoded request cannot be dispatched until it is re-addressed
//!   from its Host header

pub mod decode;
pub mod encode;

use thiserror::Error;

pub use decode::{decode, DecodedRequest};
pub use encode::encode;

/// Errors produced by the request codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The live request cannot be represented in the capture format.
    #[error("cannot encode request: {0}")]
    Encode(&'static str),

    /// The stored bytes are not a syntactically valid HTTP request.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CodecError::MalformedPayload(reason.into())
    }
}
