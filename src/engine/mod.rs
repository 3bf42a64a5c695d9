// src/engine/mod.rs

//! Message processing engine.
//!
//! The [`MessageProcessor`] runs each message through a fixed, ordered chain
//! of handlers:
//!
//! 1. [`StartHandler`] (`status == "started"`)
//! 2. [`RunningHandler`] (`status == "running"`), which has its own chain
//!    keyed by `type` (`log`, `stdout`, `stderr`, `whiteboard`)
//! 3. [`FinishHandler`] (`status == "finished"`)
//!
//! The first handler that claims a message stops the chain.
//!
//! Processing is pure and synchronous: handlers update [`CollectorState`]
//! and describe side effects as [`Effect`]s. The async shell in
//! [`crate::collector`] performs the effects (directory creation, log
//! appends, result callbacks).

use std::fmt;
use std::path::PathBuf;

use crate::codec::Map;
use crate::errors::Result;
use crate::job::JobContext;
use crate::message::Message;
use crate::state::{CollectorState, TaskId, TaskState};

pub mod core;
pub mod handlers;

pub use self::core::MessageProcessor;
pub use handlers::{AppendHandler, FinishHandler, RunningHandler, StartHandler};

/// Side effect requested by a handler, executed by the IO shell in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a directory and its parents; existing is fine.
    CreateDir { task: TaskId, path: PathBuf },
    /// Append `line` (raw bytes) plus a newline to `path`.
    AppendLine {
        task: TaskId,
        path: PathBuf,
        line: Vec<u8>,
    },
    /// Report a started task to the result sink and event listeners.
    StartTest { state: TaskState },
    /// Report a finished task (merged record) to the result sink and
    /// event listeners.
    EndTest { task: TaskId, record: Map },
}

impl Effect {
    pub fn task(&self) -> &TaskId {
        match self {
            Effect::CreateDir { task, .. }
            | Effect::AppendLine { task, .. }
            | Effect::EndTest { task, .. } => task,
            Effect::StartTest { state } => &state.id,
        }
    }
}

/// Outcome of processing a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStep {
    /// Effects for the IO shell, in execution order.
    pub effects: Vec<Effect>,
    /// False once every pending task has finished.
    pub keep_running: bool,
}

/// Everything a handler may read or change while handling a message.
pub struct HandlerContext<'a> {
    pub state: &'a mut CollectorState,
    pub job: &'a JobContext,
    pub effects: &'a mut Vec<Effect>,
    pub verbose: bool,
}

/// One link of the handler chain.
///
/// `Ok(true)` claims the message, `Ok(false)` passes it on. An error also
/// claims the message; the processor logs and counts it.
pub trait MessageHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn handle(&self, message: &Message, cx: &mut HandlerContext<'_>) -> Result<bool>;
}
