//! The ranking contract shared by the client and server rankers.
//!
//! Both sides implement the ranking independently; this module pins the
//! weights and curve parameters they must use so that, for the same task
//! set and the same "now", they produce the same order.
//!
//! A non-completed task scores
//!
//! ```text
//! score = urgency + priority_points(priority) * PRIORITY_STEP + recency
//! ```
//!
//! where
//! - `urgency` is [`OVERDUE_URGENCY`] when `due_date <= now`, otherwise
//!   `URGENCY_SCALE * URGENCY_HALF_LIFE_MS / (URGENCY_HALF_LIFE_MS + remaining_ms)`
//!   computed in 128-bit integers;
//! - `recency` is
//!   `RECENCY_SCALE * RECENCY_HALF_LIFE_MS / (RECENCY_HALF_LIFE_MS + age_ms)`.
//!
//! The remaining time is capped at [`URGENCY_HORIZON_MS`]. Up to that cap
//! the curve drops by at least one unit per millisecond, so urgency stays
//! strictly decreasing in the remaining time for every valid due date.
//!
//! Completed tasks form a separate partition after all open tasks, ordered
//! by `updated_at` descending. Remaining ties are broken by id ascending.

use crate::task::{LATEST_DUE_DATE, Priority};

/// Urgency of a task due immediately (but not yet overdue) approaches this value.
pub const URGENCY_SCALE: u64 = 1_000_000_000_000_000_000;

/// Remaining time at which urgency has decayed to half of [`URGENCY_SCALE`].
pub const URGENCY_HALF_LIFE_MS: u64 = 24 * 60 * 60 * 1000;

/// Largest remaining time urgency distinguishes: the time from the epoch
/// to [`LATEST_DUE_DATE`], which bounds the remaining time of any valid task.
pub const URGENCY_HORIZON_MS: u64 = LATEST_DUE_DATE.as_millis();

/// Urgency assigned to overdue tasks.
pub const OVERDUE_URGENCY: u64 = 2 * URGENCY_SCALE;

/// Score contributed by one priority point.
pub const PRIORITY_STEP: u64 = URGENCY_SCALE / 20;

/// Upper bound of the recency tie-breaker.
pub const RECENCY_SCALE: u64 = PRIORITY_STEP / 5;

/// Age at which the recency tie-breaker has decayed to half of [`RECENCY_SCALE`].
pub const RECENCY_HALF_LIFE_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Points for each priority level.
#[must_use]
pub const fn priority_points(priority: Priority) -> u64 {
    match priority {
        Priority::Low => 1,
        Priority::Medium => 2,
        Priority::High => 3,
    }
}

/// Largest total a priority can contribute.
pub const MAX_PRIORITY_SCORE: u64 = 3 * PRIORITY_STEP;

// Dominance: overdue beats every open task regardless of priority and
// recency, and the whole recency range is worth less than one priority step.
const _: () = assert!(OVERDUE_URGENCY > URGENCY_SCALE + MAX_PRIORITY_SCORE + RECENCY_SCALE);
const _: () = assert!(RECENCY_SCALE < PRIORITY_STEP);
const _: () = assert!(MAX_PRIORITY_SCORE < URGENCY_SCALE);
// The curve slope `SCALE * h / (h + t)^2` stays at or above 1 per ms up to the horizon.
#[allow(clippy::cast_lossless)]
const _: () = assert!(
    (URGENCY_HALF_LIFE_MS as u128 + URGENCY_HORIZON_MS as u128)
        * (URGENCY_HALF_LIFE_MS as u128 + URGENCY_HORIZON_MS as u128)
        <= URGENCY_SCALE as u128 * URGENCY_HALF_LIFE_MS as u128
);
// The largest score still fits in a u64.
const _: () = assert!(OVERDUE_URGENCY.checked_add(MAX_PRIORITY_SCORE + RECENCY_SCALE).is_some());
