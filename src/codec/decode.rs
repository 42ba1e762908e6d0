//! Parsing of captured payloads back into requests.

use axum::http::{
    header::{self, HeaderName, HeaderValue},
    uri::Scheme,
    HeaderMap, Method, Request, Uri,
};
use bytes::Bytes;

use super::CodecError;

/// A request reconstructed from a captured payload.
///
/// The target is still in the form it had on the request line, so the
/// request cannot be sent as-is. Call [`DecodedRequest::into_addressed`] to
/// fold the `Host` header back into an absolute URI.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    method: Method,
    target: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl DecodedRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request-line target (`/path?query`, or absolute-form).
    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Destination authority: the `Host` header, else the absolute-form
    /// target's authority.
    pub fn host(&self) -> Option<&str> {
        match self.headers.get(header::HOST) {
            Some(value) => value.to_str().ok(),
            None => self.target.authority().map(|a| a.as_str()),
        }
    }

    /// Combine host and path/query into an absolute URI and produce a
    /// request that an HTTP client can dispatch directly.
    pub fn into_addressed(self, scheme: Scheme) -> Result<Request<Bytes>, CodecError> {
        let authority = self
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CodecError::malformed("missing Host header"))?
            .to_owned();
        let path_and_query = self
            .target
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| pq.starts_with('/'))
            .unwrap_or("/")
            .to_owned();

        let uri = Uri::builder()
            .scheme(scheme)
            .authority(authority.as_str())
            .path_and_query(path_and_query.as_str())
            .build()
            .map_err(|e| CodecError::malformed(format!("invalid destination {authority}: {e}")))?;

        let mut request = Request::new(self.body);
        *request.method_mut() = self.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}

/// Parse a textual HTTP/1.x request.
pub fn decode(payload: &[u8]) -> Result<DecodedRequest, CodecError> {
    let head_end = find_head_end(payload)
        .ok_or_else(|| CodecError::malformed("unterminated header block"))?;
    let mut lines = split_lines(&payload[..head_end]).into_iter();
    let rest = &payload[head_end + 4..];

    let request_line = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| CodecError::malformed("missing request line"))?;
    let (method, target) = parse_request_line(request_line)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = parse_header_line(line)?;
        headers.append(name, value);
    }

    let body = if headers.contains_key(header::TRANSFER_ENCODING) {
        if !is_chunked(&headers) {
            return Err(CodecError::malformed("unsupported transfer-encoding"));
        }
        let body = dechunk(rest)?;
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        body
    } else if let Some(declared) = declared_length(&headers)? {
        if rest.len() < declared {
            return Err(CodecError::malformed(format!(
                "truncated body: declared {} bytes, found {}",
                declared,
                rest.len()
            )));
        }
        Bytes::copy_from_slice(&rest[..declared])
    } else {
        Bytes::new()
    };

    Ok(DecodedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Position of the `\r\n\r\n` that ends the header block.
fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn split_lines(head: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = head;
    while let Some(pos) = find_crlf(rest) {
        lines.push(&rest[..pos]);
        rest = &rest[pos + 2..];
    }
    lines.push(rest);
    lines
}

fn parse_request_line(line: &[u8]) -> Result<(Method, Uri), CodecError> {
    let mut parts = line.split(|&b| b == b' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CodecError::malformed("request line must have three parts"));
    };

    let method = Method::from_bytes(method)
        .map_err(|_| CodecError::malformed("invalid method"))?;

    if version != b"HTTP/1.1" && version != b"HTTP/1.0" {
        return Err(CodecError::malformed(format!(
            "unsupported version {}",
            String::from_utf8_lossy(version)
        )));
    }

    let target = Uri::try_from(target)
        .map_err(|e| CodecError::malformed(format!("invalid request target: {e}")))?;
    let origin_form = target.scheme().is_none() && target.path().starts_with('/');
    let absolute_form = target.scheme().is_some() && target.authority().is_some();
    if !origin_form && !absolute_form && target != "*" {
        return Err(CodecError::malformed("request target is neither origin nor absolute form"));
    }

    Ok((method, target))
}

fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), CodecError> {
    if line.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
        return Err(CodecError::malformed("obsolete header line folding"));
    }
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| CodecError::malformed("header line without colon"))?;

    let name = HeaderName::from_bytes(&line[..colon]).map_err(|_| {
        CodecError::malformed(format!(
            "invalid header name {:?}",
            String::from_utf8_lossy(&line[..colon])
        ))
    })?;
    let value = HeaderValue::from_bytes(trim_ows(&line[colon + 1..]))
        .map_err(|_| CodecError::malformed(format!("invalid value for header {name}")))?;
    Ok((name, value))
}

fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .last()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// The body length from `Content-Length`. Repeated headers must agree.
fn declared_length(headers: &HeaderMap) -> Result<Option<usize>, CodecError> {
    let mut declared = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let len = value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| CodecError::malformed("invalid content-length"))?;
        match declared {
            Some(prev) if prev != len => {
                return Err(CodecError::malformed("conflicting content-length values"));
            }
            _ => declared = Some(len),
        }
    }
    Ok(declared)
}

/// Decode a chunked transfer-coded body, discarding any trailers.
fn dechunk(mut data: &[u8]) -> Result<Bytes, CodecError> {
    let truncated = || CodecError::malformed("truncated chunked body");
    let mut body = Vec::with_capacity(data.len());

    loop {
        let line_end = find_crlf(data).ok_or_else(truncated)?;
        let size_field = std::str::from_utf8(&data[..line_end])
            .ok()
            .and_then(|l| l.split(';').next())
            .map(str::trim)
            .filter(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| CodecError::malformed("invalid chunk size"))?;
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| CodecError::malformed("invalid chunk size"))?;
        data = &data[line_end + 2..];

        if size == 0 {
            // Trailer section ends with an empty line.
            loop {
                let end = find_crlf(data).ok_or_else(truncated)?;
                if end == 0 {
                    return Ok(Bytes::from(body));
                }
                data = &data[end + 2..];
            }
        }

        // Chunk sizes come from untrusted bytes; bound them by what is left.
        let end = size.checked_add(2).ok_or_else(truncated)?;
        if data.len() < end {
            return Err(truncated());
        }
        if &data[size..end] != b"\r\n" {
            return Err(CodecError::malformed("chunk not terminated by CRLF"));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[end..];
    }
}
