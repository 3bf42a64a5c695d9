// src/state/registry.rs

//! Task registry, pending set and result index.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::task::{ResultKind, TaskId, TaskState};

/// Task id → state, one entry per started task.
#[derive(Debug, Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskState>,
}

impl TaskRegistry {
    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&TaskState> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TaskState> {
        self.tasks.get_mut(id)
    }

    /// Insert a new task. Returns `false` (and leaves the existing entry
    /// untouched) if the id is already known.
    pub(crate) fn insert(&mut self, state: TaskState) -> bool {
        if self.tasks.contains_key(&state.id) {
            return false;
        }
        self.tasks.insert(state.id.clone(), state);
        true
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskState> {
        self.tasks.values()
    }
}

/// Tasks whose completion the server waits for.
///
/// Watching is only enabled when the set starts out non-empty; an initially
/// empty set never counts as drained.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    ids: BTreeSet<TaskId>,
    watching: bool,
}

impl PendingSet {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TaskId>,
    {
        let ids: BTreeSet<TaskId> = ids.into_iter().map(Into::into).collect();
        let watching = !ids.is_empty();
        Self { ids, watching }
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Remove an id; `false` if it was not pending.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All declared tasks have finished.
    pub fn is_drained(&self) -> bool {
        self.watching && self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.ids.iter()
    }
}

/// Result bucket (lower-case classification) → task ids, in the order their
/// `finished` messages were processed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultIndex {
    buckets: BTreeMap<String, Vec<TaskId>>,
}

impl ResultIndex {
    pub(crate) fn record(&mut self, kind: &ResultKind, id: TaskId) {
        self.buckets.entry(kind.bucket()).or_default().push(id);
    }

    pub fn get(&self, bucket: &str) -> &[TaskId] {
        self.buckets.get(bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&str, &[TaskId])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of bucket keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of recorded tasks across all buckets.
    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Plain string view, handy for assertions and summaries.
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.buckets
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().map(|id| id.to_string()).collect()))
            .collect()
    }
}
