//! Client-side task ranking.
//!
//! Orders the cached tasks the way the server orders its listing, using
//! the weights pinned in [`tasklane_proto::ranking`]. The server carries
//! its own implementation; the two must agree for any shared "now".

use std::cmp::Ordering;

use tasklane_proto::ranking::{
    OVERDUE_URGENCY, PRIORITY_STEP, RECENCY_HALF_LIFE_MS, RECENCY_SCALE, URGENCY_HALF_LIFE_MS,
    URGENCY_HORIZON_MS, URGENCY_SCALE, priority_points,
};
use tasklane_proto::task::{Task, TaskId, TaskStatus, Timestamp};

/// Which partition a task ranks in. Open tasks always come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Partition {
    /// Pending or in progress.
    Open,
    /// Completed.
    Completed,
}

/// Sort key of one task at one instant.
///
/// For open tasks `weight` is the combined score; for completed tasks it
/// is the `updated_at` instant. Higher weights rank earlier within a
/// partition, and `id` breaks any remaining tie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankKey {
    /// Partition, compared first.
    pub partition: Partition,
    /// Combined score or update instant, compared descending.
    pub weight: u64,
    /// Final tie-breaker, compared ascending.
    pub id: TaskId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partition
            .cmp(&other.partition)
            .then_with(|| other.weight.cmp(&self.weight))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn decay(scale: u64, half_life_ms: u64, elapsed_ms: u64) -> u64 {
    let numerator = u128::from(scale) * u128::from(half_life_ms);
    let denominator = u128::from(half_life_ms) + u128::from(elapsed_ms);
    // Never above `scale`, so the narrowing cannot fail.
    u64::try_from(numerator / denominator).unwrap_or(scale)
}

/// Urgency of an open task: maximal once due, otherwise shrinking with the time left.
#[must_use]
pub fn urgency(due_date: Timestamp, now: Timestamp) -> u64 {
    if due_date <= now {
        OVERDUE_URGENCY
    } else {
        let remaining = now.millis_until(due_date).min(URGENCY_HORIZON_MS);
        decay(URGENCY_SCALE, URGENCY_HALF_LIFE_MS, remaining)
    }
}

/// Recency tie-breaker: newer tasks score slightly higher.
#[must_use]
pub fn recency(created_at: Timestamp, now: Timestamp) -> u64 {
    decay(RECENCY_SCALE, RECENCY_HALF_LIFE_MS, created_at.millis_until(now))
}

/// Computes the sort key of `task` as seen at `now`.
#[must_use]
pub fn score(task: &Task, now: Timestamp) -> RankKey {
    if task.status == TaskStatus::Completed {
        return RankKey {
            partition: Partition::Completed,
            weight: task.updated_at.as_millis(),
            id: task.id.clone(),
        };
    }
    let weight = urgency(task.due_date, now)
        + priority_points(task.priority) * PRIORITY_STEP
        + recency(task.created_at, now);
    RankKey {
        partition: Partition::Open,
        weight,
        id: task.id.clone(),
    }
}

/// Compares two tasks; `Less` means `a` ranks before `b`.
#[must_use]
pub fn compare(a: &Task, b: &Task, now: Timestamp) -> Ordering {
    score(a, now).cmp(&score(b, now))
}

/// Returns the tasks in ranked order.
#[must_use]
pub fn rank(tasks: &[Task], now: Timestamp) -> Vec<Task> {
    let mut keyed: Vec<(RankKey, &Task)> = tasks.iter().map(|t| (score(t, now), t)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, t)| t.clone()).collect()
}
