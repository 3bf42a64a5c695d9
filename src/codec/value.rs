// src/codec/value.rs

//! Decoded message values.
//!
//! This is a JSON tree with one extra variant, [`Value::Bytes`], which is
//! what `{"__base64_encoded__": "..."}` objects turn into after decoding.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Number;

use super::{BASE64_KEY, DecodeError};

/// Open mapping of field name to value.
pub type Map = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Convert a parsed JSON tree, replacing every base64-tagged object with
    /// the bytes it carries.
    ///
    /// Only an object whose sole key is `__base64_encoded__` with a string
    /// value is substituted; anything else stays an ordinary object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, DecodeError> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(serde_json::Value::String(encoded)) = obj.get(BASE64_KEY) {
                        let bytes = STANDARD
                            .decode(encoded.as_bytes())
                            .map_err(|source| DecodeError::Base64 { source })?;
                        return Ok(Value::Bytes(bytes));
                    }
                }
                Value::Object(map_from_json(obj)?)
            }
        })
    }

    /// Inverse of [`Value::from_json`]: bytes become base64-tagged objects.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => {
                let mut obj = serde_json::Map::new();
                obj.insert(
                    BASE64_KEY.to_string(),
                    serde_json::Value::String(STANDARD.encode(b)),
                );
                serde_json::Value::Object(obj)
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

pub(crate) fn map_from_json(
    obj: serde_json::Map<String, serde_json::Value>,
) -> Result<Map, DecodeError> {
    obj.into_iter()
        .map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
        .collect()
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and map to `null`.
    fn from(f: f64) -> Self {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Object(m)
    }
}
