// src/state/mod.rs

//! In-memory collector state.
//!
//! All of it is owned by a single collector task (see [`crate::collector`]),
//! so nothing here needs locking. The message processor is the only writer.

use serde::Serialize;

pub mod registry;
pub mod task;

pub use registry::{PendingSet, ResultIndex, TaskRegistry};
pub use task::{ResultKind, TaskId, TaskState};

/// Counters for recoverable problems and processed traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    pub messages: u64,
    pub decode_errors: u64,
    pub protocol_errors: u64,
    pub duplicate_starts: u64,
    pub unknown_tasks: u64,
    pub handler_errors: u64,
    pub sentinels: u64,
}

/// Registry, pending set and result index, updated together per message.
#[derive(Debug, Clone, Default)]
pub struct CollectorState {
    pub registry: TaskRegistry,
    pub pending: PendingSet,
    pub results: ResultIndex,
    pub stats: CollectorStats,
}

impl CollectorState {
    pub fn new(pending: PendingSet) -> Self {
        Self {
            pending,
            ..Self::default()
        }
    }
}
