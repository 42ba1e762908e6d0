//! Serialization of a buffered request into the capture format.

use axum::http::{header, Request};
use bytes::{BufMut, Bytes, BytesMut};

use super::CodecError;

/// Encode a fully buffered request as a textual HTTP/1.1 request.
///
/// The `host` header is always written first, taken from the `Host` header
/// or, failing that, from the URI authority. Remaining headers follow in
/// header-map order with their multiplicity intact. `transfer-encoding` is
/// dropped and `content-length` always states the real body length.
pub fn encode(request: &Request<Bytes>) -> Result<Bytes, CodecError> {
    let uri = request.uri();
    let host = request
        .headers()
        .get(header::HOST)
        .map(|v| v.as_bytes())
        .or_else(|| uri.authority().map(|a| a.as_str().as_bytes()))
        .ok_or(CodecError::Encode("request has no Host header or URI authority"))?;

    let body = request.body();
    let mut out = BytesMut::with_capacity(256 + body.len());

    // Request line (origin-form)
    out.put_slice(request.method().as_str().as_bytes());
    out.put_u8(b' ');
    let path = uri.path();
    out.put_slice(if path.is_empty() { "/" } else { path }.as_bytes());
    if let Some(query) = uri.query() {
        out.put_u8(b'?');
        out.put_slice(query.as_bytes());
    }
    out.put_slice(b" HTTP/1.1\r\n");

    put_header(&mut out, header::HOST.as_str().as_bytes(), host);

    let body_len = body.len().to_string();
    let mut length_written = false;
    for (name, value) in request.headers() {
        if name == header::HOST || name == header::TRANSFER_ENCODING {
            continue;
        }
        if name == header::CONTENT_LENGTH {
            if !length_written {
                put_header(&mut out, name.as_str().as_bytes(), body_len.as_bytes());
                length_written = true;
            }
            continue;
        }
        put_header(&mut out, name.as_str().as_bytes(), value.as_bytes());
    }
    if !length_written && !body.is_empty() {
        put_header(
            &mut out,
            header::CONTENT_LENGTH.as_str().as_bytes(),
            body_len.as_bytes(),
        );
    }

    out.put_slice(b"\r\n");
    out.put_slice(body);
    Ok(out.freeze())
}

fn put_header(out: &mut BytesMut, name: &[u8], value: &[u8]) {
    out.put_slice(name);
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(b"\r\n");
}
