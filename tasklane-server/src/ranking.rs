//! Server-side ranking of the task listing.
//!
//! Uses the weights from [`tasklane_proto::ranking`]. Clients rank their
//! cached copy with their own implementation, so this one must produce the
//! same order for the same tasks and the same instant.

use std::cmp::Reverse;

use tasklane_proto::ranking::{
    OVERDUE_URGENCY, PRIORITY_STEP, RECENCY_HALF_LIFE_MS, RECENCY_SCALE, URGENCY_HALF_LIFE_MS,
    URGENCY_HORIZON_MS, URGENCY_SCALE, priority_points,
};
use tasklane_proto::task::{Task, TaskId, TaskStatus, Timestamp};

/// `scale * half_life / (half_life + elapsed)` in 128-bit integers.
fn hyperbolic(scale: u64, half_life_ms: u64, elapsed_ms: u64) -> u64 {
    let value = u128::from(scale) * u128::from(half_life_ms)
        / (u128::from(half_life_ms) + u128::from(elapsed_ms));
    u64::try_from(value).unwrap_or(scale)
}

/// Score of an open task at `now`. Higher ranks earlier.
#[must_use]
pub fn open_task_score(task: &Task, now: Timestamp) -> u64 {
    let due = task.due_date.as_millis();
    let at = now.as_millis();
    let urgency = if due <= at {
        OVERDUE_URGENCY
    } else {
        hyperbolic(
            URGENCY_SCALE,
            URGENCY_HALF_LIFE_MS,
            (due - at).min(URGENCY_HORIZON_MS),
        )
    };
    let age = at.saturating_sub(task.created_at.as_millis());
    urgency
        + priority_points(task.priority) * PRIORITY_STEP
        + hyperbolic(RECENCY_SCALE, RECENCY_HALF_LIFE_MS, age)
}

/// Returns `tasks` in ranked order as seen at `now`.
///
/// Open tasks come first by descending score; completed tasks follow,
/// most recently updated first. Ties fall back to id order.
#[must_use]
pub fn rank_tasks(mut tasks: Vec<Task>, now: Timestamp) -> Vec<Task> {
    tasks.sort_by_cached_key(|task| -> (bool, Reverse<u64>, TaskId) {
        let completed = task.status == TaskStatus::Completed;
        let weight = if completed {
            task.updated_at.as_millis()
        } else {
            open_task_score(task, now)
        };
        (completed, Reverse(weight), task.id.clone())
    });
    tasks
}
