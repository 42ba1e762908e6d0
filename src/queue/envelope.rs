//! The persisted unit of the relay.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// A deferred request as stored in the queue.
///
/// Serialized as `{"id": "...", "request": "..."}`, where `request` holds the
/// captured HTTP/1.1 text produced by [`crate::codec::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(rename = "request", alias = "Request")]
    pub payload: String,
}

impl Envelope {
    /// Wrap an encoded request. The payload travels as a JSON string, so it
    /// must be valid UTF-8.
    pub fn new(id: String, payload: Bytes) -> Result<Self, CodecError> {
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|_| CodecError::Encode("request is not valid UTF-8 text"))?;
        Ok(Self { id, payload })
    }

    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_field_names() {
        let envelope = Envelope {
            id: "0190b8f4-0000-7000-8000-000000000001".into(),
            payload: "GET / HTTP/1.1\r\nhost: h\r\n\r\n".into(),
        };

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["id"], "0190b8f4-0000-7000-8000-000000000001");
        assert_eq!(json["request"], "GET / HTTP/1.1\r\nhost: h\r\n\r\n");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_reads_producer_json() {
        let envelope =
            Envelope::from_json(br#"{"id":"abc","request":"GET /x HTTP/1.1\r\nHost: h\r\n\r\n"}"#)
                .unwrap();
        assert_eq!(envelope.id, "abc");
        assert!(envelope.payload.starts_with("GET /x"));
    }

    #[test]
    fn test_reads_capitalized_field_names() {
        let envelope = Envelope::from_json(br#"{"ID":"abc","Request":"GET / HTTP/1.1\r\n\r\n"}"#).unwrap();
        assert_eq!(envelope.id, "abc");
        assert_eq!(envelope.payload, "GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn test_non_utf8_payload_rejected() {
        let result = Envelope::new("id".into(), Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(result, Err(CodecError::Encode(_))));
    }
}
