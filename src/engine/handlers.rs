// src/engine/handlers.rs

//! The handlers making up the processing chain.

use tracing::{debug, info, warn};

use crate::codec::{Map, Value};
use crate::errors::{CollectorError, Result};
use crate::message::{Message, Running};
use crate::state::{ResultKind, TaskState};

use super::{Effect, HandlerContext, MessageHandler};

/// Fields of a `started` message that become typed `TaskState` fields.
const STARTED_KNOWN_FIELDS: &[&str] = &["status", "id", "time"];

/// Creates the task directory and registers the task.
#[derive(Debug, Default)]
pub struct StartHandler;

impl MessageHandler for StartHandler {
    fn name(&self) -> &'static str {
        "started"
    }

    fn handle(&self, message: &Message, cx: &mut HandlerContext<'_>) -> Result<bool> {
        let Message::Started(msg) = message else {
            return Ok(false);
        };

        if cx.state.registry.contains(msg.id.as_str()) {
            return Err(CollectorError::DuplicateStart(msg.id.clone()));
        }

        let base_dir = cx.job.test_results_dir();
        let task_dir = base_dir.join(msg.id.fs_safe());

        let extra: Map = msg
            .fields
            .iter()
            .filter(|(k, _)| !STARTED_KNOWN_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let state = TaskState {
            id: msg.id.clone(),
            base_dir,
            task_dir: task_dir.clone(),
            job_log_dir: cx.job.logdir().to_path_buf(),
            job_unique_id: cx.job.unique_id().to_string(),
            time_start: msg.time,
            time_end: None,
            time_elapsed: None,
            result: None,
            extra,
        };

        cx.effects.push(Effect::CreateDir {
            task: msg.id.clone(),
            path: task_dir,
        });
        cx.effects.push(Effect::StartTest {
            state: state.clone(),
        });
        cx.state.registry.insert(state);

        if cx.verbose {
            info!(task = %msg.id, time = msg.time, "task started");
        } else {
            debug!(task = %msg.id, time = msg.time, "task started");
        }

        Ok(true)
    }
}

/// Appends the `log` payload of a `running` message of one `type` to a file
/// in the task directory.
///
/// `log` messages carry text. The stream handlers (`stdout`, `stderr`,
/// `whiteboard`) also take base64-tagged bytes, written out unchanged.
#[derive(Debug, Clone, Copy)]
pub struct AppendHandler {
    kind: &'static str,
    file_name: &'static str,
    binary: bool,
}

impl AppendHandler {
    pub const fn new(kind: &'static str, file_name: &'static str, binary: bool) -> Self {
        Self {
            kind,
            file_name,
            binary,
        }
    }

    /// `type == "log"` → `debug.log`
    pub const fn log() -> Self {
        Self::new("log", "debug.log", false)
    }

    pub const fn stdout() -> Self {
        Self::new("stdout", "stdout", true)
    }

    pub const fn stderr() -> Self {
        Self::new("stderr", "stderr", true)
    }

    pub const fn whiteboard() -> Self {
        Self::new("whiteboard", "whiteboard", true)
    }

    fn handle(&self, msg: &Running, task: &TaskState, effects: &mut Vec<Effect>) -> Result<bool> {
        if msg.kind.as_deref() != Some(self.kind) {
            return Ok(false);
        }

        let line = if self.binary {
            msg.payload()?.to_vec()
        } else {
            msg.log()?.as_bytes().to_vec()
        };
        effects.push(Effect::AppendLine {
            task: msg.id.clone(),
            path: task.task_dir.join(self.file_name),
            line,
        });
        Ok(true)
    }
}

/// Dispatches `running` messages to the sub-handler matching their `type`.
#[derive(Debug)]
pub struct RunningHandler {
    handlers: Vec<AppendHandler>,
}

impl RunningHandler {
    pub fn new() -> Self {
        Self {
            handlers: vec![
                AppendHandler::log(),
                AppendHandler::stdout(),
                AppendHandler::stderr(),
                AppendHandler::whiteboard(),
            ],
        }
    }
}

impl Default for RunningHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for RunningHandler {
    fn name(&self) -> &'static str {
        "running"
    }

    fn handle(&self, message: &Message, cx: &mut HandlerContext<'_>) -> Result<bool> {
        let Message::Running(msg) = message else {
            return Ok(false);
        };

        let Some(task) = cx.state.registry.get(msg.id.as_str()) else {
            return Err(CollectorError::UnknownTask(msg.id.clone()));
        };
        if task.is_finished() {
            return Err(CollectorError::AlreadyFinished(msg.id.clone()));
        }

        for handler in &self.handlers {
            if handler.handle(msg, task, cx.effects)? {
                return Ok(true);
            }
        }

        debug!(
            task = %msg.id,
            kind = msg.kind.as_deref().unwrap_or("<none>"),
            "running message without a matching sub-handler"
        );
        Ok(true)
    }
}

/// Records the result, updates the result index and pending set, and builds
/// the merged record for result callbacks.
#[derive(Debug, Default)]
pub struct FinishHandler;

impl MessageHandler for FinishHandler {
    fn name(&self) -> &'static str {
        "finished"
    }

    fn handle(&self, message: &Message, cx: &mut HandlerContext<'_>) -> Result<bool> {
        let Message::Finished(msg) = message else {
            return Ok(false);
        };

        let Some(task) = cx.state.registry.get_mut(msg.id.as_str()) else {
            return Err(CollectorError::UnknownTask(msg.id.clone()));
        };
        if task.is_finished() {
            return Err(CollectorError::AlreadyFinished(msg.id.clone()));
        }

        let kind = ResultKind::new(&msg.result);
        task.finish(msg.time, kind.clone());

        // Message fields win over leftover `started` fields; the fixed task
        // metadata wins over both.
        let mut record = msg.fields.clone();
        for (key, value) in &task.extra {
            record.entry(key.clone()).or_insert_with(|| value.clone());
        }
        record.extend(task.metadata());
        record.insert("status".into(), Value::from(kind.as_str()));
        record.insert("time_end".into(), Value::from(task.time_end.unwrap_or(msg.time)));
        record.insert(
            "time_elapsed".into(),
            Value::from(task.time_elapsed.unwrap_or_default()),
        );
        record
            .entry("logdir".to_string())
            .or_insert_with(|| Value::from(""));

        let elapsed = task.time_elapsed.unwrap_or_default();

        cx.state.results.record(&kind, msg.id.clone());

        if cx.state.pending.is_watching() && !cx.state.pending.remove(msg.id.as_str()) {
            warn!(task = %msg.id, "finished task was not in the pending set");
        }

        cx.effects.push(Effect::EndTest {
            task: msg.id.clone(),
            record,
        });

        if cx.verbose {
            info!(task = %msg.id, result = %kind, elapsed, "task finished");
        } else {
            debug!(task = %msg.id, result = %kind, elapsed, "task finished");
        }

        Ok(true)
    }
}
