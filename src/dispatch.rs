// src/dispatch.rs

//! Result callbacks.
//!
//! The collector reports task transitions to two kinds of consumers:
//!
//! - one [`ResultSink`] (the job result: `start_test` / `check_test`)
//! - any number of [`ResultEvents`] listeners, broadcast to by a
//!   [`Dispatcher`] (`start_test` / `end_test`)
//!
//! Callback failures never stop the collector; they are returned to the
//! caller, which logs them against the task.

use anyhow::Result;
use tracing::{debug, info};

use crate::codec::Map;
use crate::state::TaskState;

/// The job's result object.
pub trait ResultSink: Send {
    fn start_test(&mut self, state: &TaskState) -> Result<()>;

    fn check_test(&mut self, record: &Map) -> Result<()>;
}

/// A listener for task start/end events.
pub trait ResultEvents: Send {
    fn name(&self) -> &str;

    fn start_test(&mut self, state: &TaskState) -> Result<()>;

    fn end_test(&mut self, record: &Map) -> Result<()>;
}

/// Sink that accepts everything and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn start_test(&mut self, _state: &TaskState) -> Result<()> {
        Ok(())
    }

    fn check_test(&mut self, _record: &Map) -> Result<()> {
        Ok(())
    }
}

/// Broadcasts events to every registered listener, in registration order.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<Box<dyn ResultEvents>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "listeners",
                &self.listeners.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn ResultEvents>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Call `start_test` on every listener. A failing listener does not
    /// prevent the others from being called; failures are returned with the
    /// listener name.
    pub fn start_test(&mut self, state: &TaskState) -> Vec<(String, anyhow::Error)> {
        let mut failures = Vec::new();
        for listener in self.listeners.iter_mut() {
            if let Err(err) = listener.start_test(state) {
                failures.push((listener.name().to_string(), err));
            }
        }
        failures
    }

    pub fn end_test(&mut self, record: &Map) -> Vec<(String, anyhow::Error)> {
        let mut failures = Vec::new();
        for listener in self.listeners.iter_mut() {
            if let Err(err) = listener.end_test(record) {
                failures.push((listener.name().to_string(), err));
            }
        }
        failures
    }
}

/// Human-readable progress lines, one per transition.
///
/// At `info` when verbose, `debug` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEvents {
    verbose: bool,
}

impl LoggingEvents {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ResultEvents for LoggingEvents {
    fn name(&self) -> &str {
        "logging"
    }

    fn start_test(&mut self, state: &TaskState) -> Result<()> {
        if self.verbose {
            info!(task = %state.id, dir = %state.task_dir.display(), "STARTED");
        } else {
            debug!(task = %state.id, dir = %state.task_dir.display(), "STARTED");
        }
        Ok(())
    }

    fn end_test(&mut self, record: &Map) -> Result<()> {
        let name = record.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        let status = record.get("status").and_then(|v| v.as_str()).unwrap_or("?");
        let elapsed = record
            .get("time_elapsed")
            .and_then(|v| v.as_f64())
            .unwrap_or_default();
        if self.verbose {
            info!(task = name, elapsed, "{status}");
        } else {
            debug!(task = name, elapsed, "{status}");
        }
        Ok(())
    }
}
