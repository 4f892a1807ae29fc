//! Argument parsing helpers and terminal output for the `tasklane` binary.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use tasklane_proto::stats::TaskStats;
use tasklane_proto::task::{Priority, Task, TaskId, TaskStatus, Timestamp};

use crate::sync::DrainReport;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Number of id characters shown in listings.
pub const SHORT_ID_LEN: usize = 8;

/// Errors in user-supplied command arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliError {
    /// The due date could not be parsed.
    #[error("invalid due date {0:?} (use RFC 3339, YYYY-MM-DD, or +N[m|h|d])")]
    InvalidDue(String),

    /// Unknown priority name.
    #[error("invalid priority {0:?} (use low, medium, high)")]
    InvalidPriority(String),

    /// Unknown status name.
    #[error("invalid status {0:?} (use pending, in_progress, completed)")]
    InvalidStatus(String),

    /// No task matches the given id.
    #[error("no task matches {0:?}")]
    UnknownTask(String),

    /// More than one task matches the given id prefix.
    #[error("{input:?} matches {count} tasks; give more of the id")]
    AmbiguousTask {
        /// What the user typed.
        input: String,
        /// How many tasks matched.
        count: usize,
    },
}

/// Parses a due date.
///
/// Accepts RFC 3339 instants, calendar dates (end of that day, UTC), and
/// offsets from `now` such as `+30m`, `+2h` or `+3d`.
///
/// # Errors
///
/// Returns [`CliError::InvalidDue`] for anything else.
pub fn parse_due(input: &str, now: Timestamp) -> Result<Timestamp, CliError> {
    let invalid = || CliError::InvalidDue(input.to_string());
    let trimmed = input.trim();

    if let Some(offset) = trimmed.strip_prefix('+') {
        let (split, unit) = offset.char_indices().last().ok_or_else(invalid)?;
        let amount: u64 = offset[..split].parse().map_err(|_| invalid())?;
        let unit_ms = match unit {
            'm' => MINUTE_MS,
            'h' => HOUR_MS,
            'd' => DAY_MS,
            _ => return Err(invalid()),
        };
        return Ok(now.plus_millis(amount.saturating_mul(unit_ms)));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return millis_to_timestamp(instant.timestamp_millis()).ok_or_else(invalid);
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())?;
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).ok_or_else(invalid)?;
    millis_to_timestamp(date.and_time(end_of_day).and_utc().timestamp_millis()).ok_or_else(invalid)
}

fn millis_to_timestamp(millis: i64) -> Option<Timestamp> {
    u64::try_from(millis).ok().map(Timestamp::from_millis)
}

/// Parses a priority name strictly.
///
/// # Errors
///
/// Returns [`CliError::InvalidPriority`] for unknown names.
pub fn parse_priority(input: &str) -> Result<Priority, CliError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "low" | "l" => Ok(Priority::Low),
        "medium" | "med" | "m" => Ok(Priority::Medium),
        "high" | "h" => Ok(Priority::High),
        _ => Err(CliError::InvalidPriority(input.to_string())),
    }
}

/// Parses a status name strictly.
///
/// # Errors
///
/// Returns [`CliError::InvalidStatus`] for unknown names.
pub fn parse_status(input: &str) -> Result<TaskStatus, CliError> {
    match input.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "pending" | "todo" => Ok(TaskStatus::Pending),
        "in_progress" | "doing" => Ok(TaskStatus::InProgress),
        "completed" | "done" => Ok(TaskStatus::Completed),
        _ => Err(CliError::InvalidStatus(input.to_string())),
    }
}

/// Finds the task `input` refers to: an exact id, or a unique id prefix.
///
/// # Errors
///
/// [`CliError::UnknownTask`] if nothing matches,
/// [`CliError::AmbiguousTask`] if the prefix is not unique.
pub fn resolve_id(tasks: &[Task], input: &str) -> Result<TaskId, CliError> {
    let input = input.trim();
    if let Some(task) = tasks.iter().find(|t| t.id.as_str() == input) {
        return Ok(task.id.clone());
    }
    let matches: Vec<&Task> = tasks
        .iter()
        .filter(|t| !input.is_empty() && t.id.as_str().starts_with(input))
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::UnknownTask(input.to_string())),
        [task] => Ok(task.id.clone()),
        _ => Err(CliError::AmbiguousTask {
            input: input.to_string(),
            count: matches.len(),
        }),
    }
}

/// Renders a timestamp as `YYYY-MM-DD HH:MM` UTC.
#[must_use]
pub fn format_timestamp(ts: Timestamp) -> String {
    i64::try_from(ts.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(|| ts.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

/// The id as shown in listings: temporary ids keep their prefix.
#[must_use]
pub fn short_id(id: &TaskId) -> String {
    let raw = id.as_str();
    let keep = if id.is_temporary() {
        SHORT_ID_LEN + tasklane_proto::task::TEMPORARY_ID_PREFIX.len()
    } else {
        SHORT_ID_LEN
    };
    raw.chars().take(keep).collect()
}

/// One listing line for `task`.
#[must_use]
pub fn format_task(task: &Task, unsynced: bool, now: Timestamp) -> String {
    let mark = match task.status {
        TaskStatus::Completed => "[x]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Pending => "[ ]",
    };
    let mut line = format!(
        "{mark} {:<12} {:<6} due {}  {}",
        short_id(&task.id),
        task.priority.as_str(),
        format_timestamp(task.due_date),
        task.title,
    );
    if task.is_overdue(now) {
        line.push_str("  OVERDUE");
    }
    if unsynced {
        line.push_str("  (unsynced)");
    }
    line
}

/// Multi-line statistics summary.
#[must_use]
pub fn format_stats(stats: &TaskStats) -> String {
    format!(
        "total: {}\npending: {}\nin progress: {}\ncompleted: {} ({}%)\noverdue: {}",
        stats.total,
        stats.pending,
        stats.in_progress,
        stats.completed,
        stats.completion_rate,
        stats.overdue,
    )
}

/// One-line summary of a drain pass.
#[must_use]
pub fn format_report(report: &DrainReport) -> String {
    let mut line = format!(
        "synced {} of {} change(s)",
        report.confirmed, report.attempted
    );
    if report.failed > 0 {
        line.push_str(&format!(", {} failed", report.failed));
    }
    if report.rejected > 0 {
        line.push_str(&format!(", {} rejected", report.rejected));
    }
    if report.skipped > 0 {
        line.push_str(&format!(", {} waiting", report.skipped));
    }
    line
}
