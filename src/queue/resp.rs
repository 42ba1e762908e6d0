//! Minimal RESP2 codec for the Redis Streams backend.
//!
//! RESP2 defines the following value types:
//! - Simple String: `+OK\r\n`
//! - Error: `-ERR message\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk String: `$6\r\nfoobar\r\n`
//! - Null Bulk String / Null Array: `$-1\r\n`, `*-1\r\n`
//! - Array: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
//!
//! Commands are always sent as arrays of bulk strings.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest bulk string accepted from the server (Redis' own ceiling).
pub const MAX_BULK_STRING_LEN: usize = 512 * 1024 * 1024;

/// Maximum number of elements in a single array.
pub const MAX_COLLECTION_ELEMENTS: usize = 1024;

/// Maximum nesting depth. Stream replies nest four levels deep.
pub const MAX_DEPTH: usize = 8;

/// Error type for RESP parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RespError {
    /// More bytes are needed; not fatal.
    #[error("incomplete data")]
    Incomplete,

    #[error("invalid prefix byte: {0:#04x}")]
    InvalidPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RespError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, RespError::Incomplete)
    }
}

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Bytes),
    Null,
    Array(Vec<Value>),
}

impl Value {
    /// Parse one value from the front of `data`, returning it with the number
    /// of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Value, usize), RespError> {
        parse_at_depth(data, 0)
    }

    /// Bulk or simple string content as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::SimpleString(b) | Value::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Append a command (array of bulk strings) to `out`.
pub fn encode_command(args: &[&[u8]], out: &mut BytesMut) {
    out.put_u8(b'*');
    out.put_slice(args.len().to_string().as_bytes());
    out.put_slice(b"\r\n");
    for arg in args {
        out.put_u8(b'$');
        out.put_slice(arg.len().to_string().as_bytes());
        out.put_slice(b"\r\n");
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

fn parse_at_depth(data: &[u8], depth: usize) -> Result<(Value, usize), RespError> {
    let Some(&prefix) = data.first() else {
        return Err(RespError::Incomplete);
    };
    match prefix {
        b'+' => {
            let end = find_crlf(data).ok_or(RespError::Incomplete)?;
            Ok((Value::SimpleString(Bytes::copy_from_slice(&data[1..end])), end + 2))
        }
        b'-' => {
            let end = find_crlf(data).ok_or(RespError::Incomplete)?;
            Ok((Value::Error(Bytes::copy_from_slice(&data[1..end])), end + 2))
        }
        b':' => {
            let (n, consumed) = parse_length_line(data)?;
            Ok((Value::Integer(n), consumed))
        }
        b'$' => parse_bulk_string(data),
        b'*' => parse_array(data, depth),
        other => Err(RespError::InvalidPrefix(other)),
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Parse the integer that follows a prefix byte up to CRLF.
fn parse_length_line(data: &[u8]) -> Result<(i64, usize), RespError> {
    let end = find_crlf(data).ok_or(RespError::Incomplete)?;
    let text = std::str::from_utf8(&data[1..end])
        .map_err(|e| RespError::InvalidInteger(e.to_string()))?;
    let n = text
        .parse::<i64>()
        .map_err(|e| RespError::InvalidInteger(e.to_string()))?;
    Ok((n, end + 2))
}

fn parse_bulk_string(data: &[u8]) -> Result<(Value, usize), RespError> {
    let (len, header) = parse_length_line(data)?;
    if len < 0 {
        return Ok((Value::Null, header));
    }

    let len = len as usize;
    if len > MAX_BULK_STRING_LEN {
        return Err(RespError::Protocol("bulk string too large".to_string()));
    }

    let data_end = header + len;
    if data.len() < data_end + 2 {
        return Err(RespError::Incomplete);
    }
    if &data[data_end..data_end + 2] != b"\r\n" {
        return Err(RespError::Protocol("missing trailing CRLF".to_string()));
    }

    Ok((
        Value::BulkString(Bytes::copy_from_slice(&data[header..data_end])),
        data_end + 2,
    ))
}

fn parse_array(data: &[u8], depth: usize) -> Result<(Value, usize), RespError> {
    if depth >= MAX_DEPTH {
        return Err(RespError::Protocol(format!("nesting too deep: {depth}")));
    }

    let (len, mut pos) = parse_length_line(data)?;
    if len < 0 {
        return Ok((Value::Null, pos));
    }

    let len = len as usize;
    if len > MAX_COLLECTION_ELEMENTS {
        return Err(RespError::Protocol(format!("array of {len} elements exceeds limit")));
    }

    let mut elements = Vec::with_capacity(len);
    for _ in 0..len {
        let (value, consumed) = parse_at_depth(&data[pos..], depth + 1)?;
        elements.push(value);
        pos += consumed;
    }
    Ok((Value::Array(elements), pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        let mut out = BytesMut::new();
        encode_command(&[b"XACK", b"stream", b"group", b"1-0"], &mut out);
        assert_eq!(
            &out[..],
            b"*4\r\n$4\r\nXACK\r\n$6\r\nstream\r\n$5\r\ngroup\r\n$3\r\n1-0\r\n"
        );
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(
            Value::parse(b"+OK\r\n").unwrap(),
            (Value::SimpleString(Bytes::from_static(b"OK")), 5)
        );
        assert_eq!(Value::parse(b":42\r\n").unwrap(), (Value::Integer(42), 5));
        assert_eq!(Value::parse(b"$-1\r\n").unwrap(), (Value::Null, 5));
        assert_eq!(Value::parse(b"*-1\r\n").unwrap(), (Value::Null, 5));

        let (err, _) = Value::parse(b"-BUSYGROUP Consumer Group name already exists\r\n").unwrap();
        assert!(matches!(err, Value::Error(ref m) if m.starts_with(b"BUSYGROUP")));
    }

    #[test]
    fn test_parse_bulk_string_with_crlf_inside() {
        let (value, consumed) = Value::parse(b"$6\r\na\r\nb\r\n\r\nrest").unwrap();
        assert_eq!(value, Value::BulkString(Bytes::from_static(b"a\r\nb\r\n")));
        assert_eq!(consumed, 12);
    }

    #[test]
    fn test_parse_stream_reply() {
        // XREADGROUP reply: [[stream, [[id, [field, value]]]]]
        let reply = b"*1\r\n*2\r\n$1\r\ns\r\n*1\r\n*2\r\n$3\r\n1-0\r\n*2\r\n$4\r\ndata\r\n$2\r\n{}\r\n";
        let (value, consumed) = Value::parse(reply).unwrap();
        assert_eq!(consumed, reply.len());

        let streams = value.into_array().unwrap();
        let stream = streams.into_iter().next().unwrap().into_array().unwrap();
        assert_eq!(stream[0].as_str(), Some("s"));
    }

    #[test]
    fn test_incomplete_input() {
        let partials: [&[u8]; 5] = [b"", b"+OK", b"$5\r\nhel", b"*2\r\n:1\r\n", b":12"];
        for partial in partials {
            assert!(Value::parse(partial).unwrap_err().is_incomplete());
        }
    }

    #[test]
    fn test_protocol_errors() {
        assert_eq!(Value::parse(b"?x\r\n").unwrap_err(), RespError::InvalidPrefix(b'?'));
        assert!(matches!(
            Value::parse(b":abc\r\n").unwrap_err(),
            RespError::InvalidInteger(_)
        ));
        assert!(matches!(
            Value::parse(b"$2\r\nabcd\r\n").unwrap_err(),
            RespError::Protocol(_)
        ));
    }
}
