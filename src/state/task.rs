// src/state/task.rs

//! Task identity and per-task state.

use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::codec::{Map, Value};

/// Characters replaced by `_` when deriving a directory name from a task id.
const FS_UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', ';'];

const FS_NAME_MAX: usize = 255;

/// Opaque task identifier, stable for the duration of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory-name form of the id.
    ///
    /// A leading `.` becomes `_` so the directory is not hidden, the name is
    /// capped at 255 characters and every filesystem-unfriendly character is
    /// replaced by `_`.
    pub fn fs_safe(&self) -> String {
        let mut name: String = self.0.chars().take(FS_NAME_MAX).collect();
        if name.starts_with('.') {
            name.replace_range(..1, "_");
        }
        name.chars()
            .map(|c| if FS_UNSAFE_CHARS.contains(&c) { '_' } else { c })
            .collect()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Result classification as reported by a runner.
///
/// Stored upper-case; [`ResultKind::bucket`] gives the lower-case key used by
/// the result index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResultKind(String);

impl ResultKind {
    pub fn new(raw: &str) -> Self {
        Self(raw.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bucket(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the collector knows about one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub id: TaskId,
    pub base_dir: PathBuf,
    pub task_dir: PathBuf,
    pub job_log_dir: PathBuf,
    pub job_unique_id: String,
    pub time_start: f64,
    pub time_end: Option<f64>,
    pub time_elapsed: Option<f64>,
    pub result: Option<ResultKind>,
    /// Fields of the `started` message the collector does not interpret.
    pub extra: Map,
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Record `finished` data. `time_end` is clamped so that it never
    /// precedes `time_start`.
    pub(crate) fn finish(&mut self, time_end: f64, result: ResultKind) {
        let time_end = time_end.max(self.time_start);
        self.time_end = Some(time_end);
        self.time_elapsed = Some(time_end - self.time_start);
        self.result = Some(result);
    }

    /// Fixed start-time metadata as an open mapping. Leftover `started`
    /// fields stay in [`TaskState::extra`].
    pub fn metadata(&self) -> Map {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.id.as_str()));
        map.insert("base_dir".into(), path_value(&self.base_dir));
        map.insert("task_dir".into(), path_value(&self.task_dir));
        map.insert("job_logdir".into(), path_value(&self.job_log_dir));
        map.insert("job_unique_id".into(), Value::from(self.job_unique_id.as_str()));
        map.insert("time_start".into(), Value::from(self.time_start));
        map
    }
}

fn path_value(path: &std::path::Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
