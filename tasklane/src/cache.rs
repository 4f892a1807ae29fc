//! Local cache of the last known-good task collection.
//!
//! The cache is what the front end renders from. It holds tasks in
//! insertion order (ranking is applied on read), the statistics computed
//! from them, and the set of ids with local changes the server has not
//! confirmed yet.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tasklane_proto::stats::TaskStats;
use tasklane_proto::task::{Task, TaskId, Timestamp};

/// Task collection plus derived statistics and pending-sync markers.
///
/// Ids are unique: [`upsert`](Self::upsert) replaces an existing entry in
/// place instead of adding a second one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCache {
    tasks: Vec<Task>,
    stats: TaskStats,
    pending: BTreeSet<TaskId>,
    refreshed_at: Option<Timestamp>,
}

impl LocalCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All cached tasks in cache order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Statistics as of the last mutation.
    #[must_use]
    pub const fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// When the cache was last replaced from the server.
    #[must_use]
    pub const fn refreshed_at(&self) -> Option<Timestamp> {
        self.refreshed_at
    }

    /// Number of cached tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the cache holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == *id)
    }

    /// Inserts `task`, or replaces the entry with the same id in place.
    pub fn upsert(&mut self, task: Task, now: Timestamp) {
        if let Some(existing) = self.get_mut(&task.id) {
            *existing = task;
        } else {
            self.tasks.push(task);
        }
        self.recompute_stats(now);
    }

    /// Removes and returns the task with `id`.
    pub fn remove(&mut self, id: &TaskId, now: Timestamp) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == *id)?;
        let task = self.tasks.remove(index);
        self.pending.remove(id);
        self.recompute_stats(now);
        Some(task)
    }

    /// Renames the entry `from` to `to`, keeping its position and every
    /// other attribute. Returns `false` if no entry has id `from`.
    ///
    /// If an entry with id `to` already exists (the server copy arrived
    /// through a refresh first), that duplicate is dropped so ids stay unique.
    pub fn rename(&mut self, from: &TaskId, to: &TaskId) -> bool {
        if self.get(from).is_none() {
            return false;
        }
        if from == to {
            return true;
        }
        self.tasks.retain(|t| t.id != *to);
        if let Some(task) = self.get_mut(from) {
            task.id = to.clone();
        }
        if self.pending.remove(from) {
            self.pending.insert(to.clone());
        }
        true
    }

    /// Replaces the whole collection with a server listing.
    pub fn replace_all(&mut self, tasks: Vec<Task>, now: Timestamp) {
        self.tasks = tasks;
        self.pending.clear();
        self.refreshed_at = Some(now);
        self.recompute_stats(now);
    }

    /// Marks `id` as having unconfirmed local changes.
    pub fn mark_pending(&mut self, id: &TaskId) {
        self.pending.insert(id.clone());
    }

    /// Whether `id` has unconfirmed local changes.
    #[must_use]
    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.pending.contains(id)
    }

    /// Ids with unconfirmed local changes.
    #[must_use]
    pub const fn pending(&self) -> &BTreeSet<TaskId> {
        &self.pending
    }

    /// Drops pending markers for which `keep` returns `false`.
    pub fn retain_pending(&mut self, keep: impl Fn(&TaskId) -> bool) {
        self.pending.retain(|id| keep(id));
    }

    /// Drops every pending marker.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Recomputes [`stats`](Self::stats) as seen at `now`.
    pub fn recompute_stats(&mut self, now: Timestamp) {
        self.stats = TaskStats::compute(&self.tasks, now);
    }
}
