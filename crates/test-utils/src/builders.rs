#![allow(dead_code)]

//! Builders for status message lines, as a runner would send them.

use serde_json::{Map, Value, json};

/// Builder for one status message; `line()` renders the wire form.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    fields: Map<String, Value>,
}

impl MessageBuilder {
    fn new(status: &str, id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("status".into(), json!(status));
        fields.insert("id".into(), json!(id));
        Self { fields }
    }

    pub fn started(id: &str, time: f64) -> Self {
        Self::new("started", id).field("time", json!(time))
    }

    pub fn running(id: &str) -> Self {
        Self::new("running", id)
    }

    /// `running` message with `type: log`.
    pub fn log(id: &str, text: &str) -> Self {
        Self::running(id)
            .field("type", json!("log"))
            .field("log", json!(text))
    }

    /// `running` message carrying base64-tagged bytes under `key`.
    pub fn bytes(id: &str, kind: &str, key: &str, payload: &[u8]) -> Self {
        Self::running(id)
            .field("type", json!(kind))
            .field(key, tagged_bytes(payload))
    }

    pub fn finished(id: &str, time: f64, result: &str) -> Self {
        Self::new("finished", id)
            .field("time", json!(time))
            .field("result", json!(result))
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    /// Wire form, without the trailing newline.
    pub fn line(self) -> String {
        self.build().to_string()
    }
}

/// `{"__base64_encoded__": "<base64>"}` for `payload`.
pub fn tagged_bytes(payload: &[u8]) -> Value {
    taskstatus::codec::Value::Bytes(payload.to_vec()).to_json()
}

/// Start, log line and `pass` for one task.
pub fn passing_task(id: &str, start: f64) -> Vec<String> {
    vec![
        MessageBuilder::started(id, start).line(),
        MessageBuilder::log(id, &format!("{id} says hello")).line(),
        MessageBuilder::finished(id, start + 1.0, "pass").line(),
    ]
}
