// src/codec/mod.rs

//! Wire codec for the status stream.
//!
//! Frames are newline-terminated JSON objects. Values of the shape
//! `{"__base64_encoded__": "<base64>"}` carry raw bytes and are replaced by
//! [`Value::Bytes`] while decoding, at any depth.
//!
//! The codec checks JSON well-formedness only; interpreting the fields is the
//! job of [`crate::message`].

use thiserror::Error;

pub mod value;

pub use value::{Map, Value};

/// Key marking a base64-encoded byte string.
pub const BASE64_KEY: &str = "__base64_encoded__";

/// Out-of-band line that asks the server to shut down.
pub const SENTINEL: &[u8] = b"bye";

/// Longest accepted line, newline included.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid base64 payload: {source}")]
    Base64 {
        #[source]
        source: base64::DecodeError,
    },

    #[error("line exceeds {MAX_LINE_BYTES} bytes")]
    LineTooLong,
}

/// Result of decoding one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Blank line: the peer is done with this connection.
    EndOfStream,
    Message(Map),
}

/// Decode a single line into a message mapping.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let text = std::str::from_utf8(bytes)?.trim();
    if text.is_empty() {
        return Ok(Frame::EndOfStream);
    }

    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(obj) => Ok(Frame::Message(value::map_from_json(obj)?)),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

/// True iff the trimmed line is exactly `bye`.
pub fn is_sentinel(bytes: &[u8]) -> bool {
    bytes.trim_ascii() == SENTINEL
}

/// Encode a value as a single JSON line body (no trailing newline).
pub fn encode(value: &Value) -> String {
    value.to_json().to_string()
}

/// Encode a mapping as a single JSON line body (no trailing newline).
pub fn encode_map(map: &Map) -> String {
    serde_json::Value::Object(
        map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
    )
    .to_string()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_newline_and_whitespace() {
        let frame = decode(b"  {\"status\":\"started\",\"id\":\"t1\"}\r\n").unwrap();
        match frame {
            Frame::Message(map) => {
                assert_eq!(map["status"].as_str(), Some("started"));
                assert_eq!(map["id"].as_str(), Some("t1"));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn blank_line_is_end_of_stream() {
        assert_eq!(decode(b"\n").unwrap(), Frame::EndOfStream);
        assert_eq!(decode(b"   \r\n").unwrap(), Frame::EndOfStream);
        assert_eq!(decode(b"").unwrap(), Frame::EndOfStream);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(decode(b"not json\n"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(&[0xff, 0xfe, b'\n']), Err(DecodeError::Utf8(_))));
        assert!(matches!(decode(b"[1,2]\n"), Err(DecodeError::NotAnObject("an array"))));
        assert!(matches!(decode(b"\"bye\"\n"), Err(DecodeError::NotAnObject("a string"))));
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_sentinel(b"bye\n"));
        assert!(is_sentinel(b"   bye\r\n"));
        assert!(is_sentinel(b"bye"));
        assert!(!is_sentinel(b"byebye\n"));
        assert!(!is_sentinel(b"BYE\n"));
        assert!(!is_sentinel(b"{\"status\":\"bye\"}\n"));
    }

    #[test]
    fn decoded_stdout_bytes() {
        let line = br#"{"status":"finished","id":"t1","stdout":{"__base64_encoded__":"aGk="}}"#;
        let Frame::Message(map) = decode(line).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(map["stdout"], Value::Bytes(b"hi".to_vec()));
    }

    #[test]
    fn encode_is_a_single_line() {
        let mut map = Map::new();
        map.insert("log".into(), Value::from("first\nsecond"));
        map.insert("blob".into(), Value::Bytes(vec![0, 159, 146, 150]));
        let line = encode_map(&map);
        assert!(!line.contains('\n'));

        let Frame::Message(back) = decode(line.as_bytes()).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(back, map);
    }
}
