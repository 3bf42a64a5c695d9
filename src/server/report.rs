// src/server/report.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::server::ServerState;
use crate::state::{CollectorState, CollectorStats, ResultIndex, TaskId, TaskRegistry};

/// Final state of a stopped server, returned by
/// [`ServerHandle::await_done`](crate::server::ServerHandle::await_done).
#[derive(Debug, Clone)]
pub struct CollectorReport {
    pub results: ResultIndex,
    /// Expected tasks that never finished.
    pub pending: Vec<TaskId>,
    pub registry: TaskRegistry,
    pub stats: CollectorStats,
    /// How the server left `Listening`: `Draining` or `Canceled`.
    pub ended_by: ServerState,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    ended_by: ServerState,
    results: &'a ResultIndex,
    counts: BTreeMap<&'a str, usize>,
    pending: &'a [TaskId],
    started: usize,
    unfinished: Vec<&'a TaskId>,
    stats: CollectorStats,
}

impl CollectorReport {
    pub(crate) fn new(state: CollectorState, ended_by: ServerState) -> Self {
        Self {
            pending: state.pending.iter().cloned().collect(),
            results: state.results,
            registry: state.registry,
            stats: state.stats,
            ended_by,
        }
    }

    /// `true` when every expected task reported in.
    pub fn all_pending_finished(&self) -> bool {
        self.pending.is_empty()
    }

    /// Tasks that started but never sent `finished`, sorted by id.
    pub fn unfinished(&self) -> Vec<&TaskId> {
        let mut ids: Vec<&TaskId> = self
            .registry
            .iter()
            .filter(|state| !state.is_finished())
            .map(|state| &state.id)
            .collect();
        ids.sort();
        ids
    }

    /// JSON summary written to `results.json` and printed by the CLI.
    pub fn summary(&self) -> serde_json::Value {
        let summary = Summary {
            ended_by: self.ended_by,
            results: &self.results,
            counts: self
                .results
                .buckets()
                .map(|(bucket, ids)| (bucket, ids.len()))
                .collect(),
            pending: &self.pending,
            started: self.registry.len(),
            unfinished: self.unfinished(),
            stats: self.stats,
        };
        serde_json::to_value(summary).unwrap_or(serde_json::Value::Null)
    }
}
