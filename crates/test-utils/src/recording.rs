//! Result sinks and listeners that remember what they were told.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use taskstatus::codec::Map;
use taskstatus::dispatch::{ResultEvents, ResultSink};
use taskstatus::state::TaskState;

/// One observed callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Start(String),
    /// Task name and upper-case status of the finish record.
    End(String, String),
}

/// Shared log of callbacks; clone it before handing the sink to a server.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    events: Arc<Mutex<Vec<Recorded>>>,
    records: Arc<Mutex<Vec<Map>>>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    /// Finish records, in arrival order.
    pub fn records(&self) -> Vec<Map> {
        self.records.lock().unwrap().clone()
    }

    pub fn sink(&self) -> RecordingSink {
        RecordingSink {
            recording: self.clone(),
        }
    }

    pub fn listener(&self, name: &str) -> RecordingEvents {
        RecordingEvents {
            name: name.to_string(),
            recording: self.clone(),
            fail: false,
        }
    }

    /// A listener whose every callback fails after recording.
    pub fn failing_listener(&self, name: &str) -> RecordingEvents {
        RecordingEvents {
            fail: true,
            ..self.listener(name)
        }
    }

    fn start(&self, state: &TaskState) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Start(state.id.to_string()));
    }

    fn end(&self, record: &Map) {
        let field = |key: &str| {
            record
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        self.events
            .lock()
            .unwrap()
            .push(Recorded::End(field("name"), field("status")));
        self.records.lock().unwrap().push(record.clone());
    }
}

#[derive(Debug, Clone)]
pub struct RecordingSink {
    recording: Recording,
}

impl ResultSink for RecordingSink {
    fn start_test(&mut self, state: &TaskState) -> Result<()> {
        self.recording.start(state);
        Ok(())
    }

    fn check_test(&mut self, record: &Map) -> Result<()> {
        self.recording.end(record);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordingEvents {
    name: String,
    recording: Recording,
    fail: bool,
}

impl RecordingEvents {
    fn outcome(&self) -> Result<()> {
        if self.fail {
            Err(anyhow!("listener '{}' refused the event", self.name))
        } else {
            Ok(())
        }
    }
}

impl ResultEvents for RecordingEvents {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_test(&mut self, state: &TaskState) -> Result<()> {
        self.recording.start(state);
        self.outcome()
    }

    fn end_test(&mut self, record: &Map) -> Result<()> {
        self.recording.end(record);
        self.outcome()
    }
}
