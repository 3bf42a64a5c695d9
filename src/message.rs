// src/message.rs

//! Typed runner messages.
//!
//! A decoded line is an open mapping; this module turns it into one of three
//! variants keyed by the `status` field. Fields the collector does not
//! interpret are kept in `fields` so result callbacks still see them.

use thiserror::Error;

use crate::codec::{Map, Value};
use crate::state::TaskId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown status '{0}'")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Started(Started),
    Running(Running),
    Finished(Finished),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Started {
    pub id: TaskId,
    pub time: f64,
    pub fields: Map,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Running {
    pub id: TaskId,
    /// The `type` sub-discriminator, e.g. `log`.
    pub kind: Option<String>,
    pub fields: Map,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub id: TaskId,
    pub time: f64,
    pub result: String,
    pub fields: Map,
}

impl Message {
    pub fn id(&self) -> &TaskId {
        match self {
            Message::Started(m) => &m.id,
            Message::Running(m) => &m.id,
            Message::Finished(m) => &m.id,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Message::Started(_) => "started",
            Message::Running(_) => "running",
            Message::Finished(_) => "finished",
        }
    }
}

impl Running {
    /// Text payload of a `log` message.
    pub fn log(&self) -> Result<&str, ProtocolError> {
        match self.fields.get("log") {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ProtocolError::InvalidField {
                field: "log",
                expected: "a string",
            }),
            None => Err(ProtocolError::MissingField("log")),
        }
    }

    /// Raw payload of a `stdout`/`stderr`/`whiteboard` message: text or
    /// decoded base64 bytes.
    pub fn payload(&self) -> Result<&[u8], ProtocolError> {
        match self.fields.get("log") {
            Some(Value::String(s)) => Ok(s.as_bytes()),
            Some(Value::Bytes(b)) => Ok(b),
            Some(_) => Err(ProtocolError::InvalidField {
                field: "log",
                expected: "a string or base64-encoded bytes",
            }),
            None => Err(ProtocolError::MissingField("log")),
        }
    }
}

impl TryFrom<Map> for Message {
    type Error = ProtocolError;

    fn try_from(fields: Map) -> Result<Self, Self::Error> {
        let status = required_str(&fields, "status")?.to_string();
        let id = TaskId::new(required_str(&fields, "id")?);

        match status.as_str() {
            "started" => {
                let time = required_f64(&fields, "time")?;
                Ok(Message::Started(Started { id, time, fields }))
            }
            "running" => {
                let kind = match fields.get("type") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(_) => {
                        return Err(ProtocolError::InvalidField {
                            field: "type",
                            expected: "a string",
                        });
                    }
                };
                Ok(Message::Running(Running { id, kind, fields }))
            }
            "finished" => {
                let time = required_f64(&fields, "time")?;
                let result = required_str(&fields, "result")?.to_string();
                Ok(Message::Finished(Finished {
                    id,
                    time,
                    result,
                    fields,
                }))
            }
            _ => Err(ProtocolError::UnknownStatus(status)),
        }
    }
}

fn required_str<'a>(fields: &'a Map, field: &'static str) -> Result<&'a str, ProtocolError> {
    match fields.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ProtocolError::InvalidField {
            field,
            expected: "a string",
        }),
        None => Err(ProtocolError::MissingField(field)),
    }
}

fn required_f64(fields: &Map, field: &'static str) -> Result<f64, ProtocolError> {
    match fields.get(field) {
        Some(value) => value.as_f64().ok_or(ProtocolError::InvalidField {
            field,
            expected: "a number",
        }),
        None => Err(ProtocolError::MissingField(field)),
    }
}
