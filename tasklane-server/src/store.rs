//! In-memory task table.
//!
//! The [`TaskStore`] is the server's only state. It lives for the process
//! lifetime; nothing is persisted.

use std::collections::HashMap;

use tasklane_proto::task::{Task, TaskId, TaskPatch, Timestamp};
use tokio::sync::RwLock;

/// Thread-safe map of tasks keyed by id.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `task`, replacing any task with the same id.
    pub async fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.clone(), task);
    }

    /// Returns a copy of one task.
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Applies `patch` to the task with `id` and returns the updated copy.
    pub async fn update(&self, id: &TaskId, patch: &TaskPatch, now: Timestamp) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id)?;
        task.apply_patch(patch, now);
        Some(task.clone())
    }

    /// Removes the task with `id`, returning it if it existed.
    pub async fn remove(&self, id: &TaskId) -> Option<Task> {
        self.tasks.write().await.remove(id)
    }

    /// Copies of every task, in no particular order.
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
