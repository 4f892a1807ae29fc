//! Aggregate counts over a task collection.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskStatus, Timestamp};

/// Summary statistics for a set of tasks at a given instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    /// Number of tasks.
    pub total: u32,
    /// Tasks not yet started.
    pub pending: u32,
    /// Tasks being worked on.
    pub in_progress: u32,
    /// Finished tasks.
    pub completed: u32,
    /// Open tasks whose due date has been reached.
    pub overdue: u32,
    /// Completed share of all tasks, as a whole percentage (0..=100).
    pub completion_rate: u8,
}

impl TaskStats {
    /// Computes statistics over `tasks` as seen at `now`.
    #[must_use]
    pub fn compute<'a>(tasks: impl IntoIterator<Item = &'a Task>, now: Timestamp) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            stats.total = stats.total.saturating_add(1);
            match task.status {
                TaskStatus::Pending => stats.pending = stats.pending.saturating_add(1),
                TaskStatus::InProgress => stats.in_progress = stats.in_progress.saturating_add(1),
                TaskStatus::Completed => stats.completed = stats.completed.saturating_add(1),
            }
            if task.is_overdue(now) {
                stats.overdue = stats.overdue.saturating_add(1);
            }
        }
        if stats.total > 0 {
            let rate = u64::from(stats.completed) * 100 / u64::from(stats.total);
            stats.completion_rate = u8::try_from(rate).unwrap_or(100);
        }
        stats
    }
}
