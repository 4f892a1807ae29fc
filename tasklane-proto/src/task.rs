//! Task model shared by the Tasklane client and server.
//!
//! Defines task identities (temporary vs. permanent), the lenient
//! priority/status enums, the create and patch payloads, and the
//! validation rules both sides enforce before accepting a mutation.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Maximum allowed task description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Category assigned when a task is created without one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Latest accepted due date: 2200-01-01T00:00:00Z.
///
/// Urgency stays strictly decreasing in integer arithmetic up to this
/// instant (see [`crate::ranking`]).
pub const LATEST_DUE_DATE: Timestamp = Timestamp::from_millis(7_258_118_400_000);

/// Reserved prefix marking a client-minted, not yet confirmed identity.
pub const TEMPORARY_ID_PREFIX: &str = "tmp-";

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns this timestamp shifted forward by `millis`, saturating.
    #[must_use]
    pub const fn plus_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp shifted backward by `millis`, saturating at zero.
    #[must_use]
    pub const fn minus_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    /// Milliseconds from `self` until `later`, or zero if `later` is not after `self`.
    #[must_use]
    pub const fn millis_until(self, later: Self) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Identity of a task.
///
/// Either *temporary* (minted on the client while the server has not yet
/// confirmed the create, always prefixed with [`TEMPORARY_ID_PREFIX`]) or
/// *permanent* (assigned by the server). A temporary id is replaced by the
/// permanent one on reconciliation; the two are never aliased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Mints a new temporary identifier. Never reused: backed by UUID v7.
    #[must_use]
    pub fn new_temporary() -> Self {
        Self(format!("{TEMPORARY_ID_PREFIX}{}", Uuid::now_v7()))
    }

    /// Mints a new permanent identifier (server side).
    #[must_use]
    pub fn new_permanent() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether this id was minted locally and is awaiting confirmation.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority. Unknown wire values decode as [`Priority::Medium`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority (the fallback).
    #[default]
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// Wire/display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parses a priority, falling back to `Medium` for anything unrecognised.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_lenient(deserializer, Self::parse_lossy)
    }
}

/// Workflow status of a task. Unknown wire values decode as [`TaskStatus::Pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    /// Not started (the fallback).
    #[default]
    Pending,
    /// Actively being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Wire/display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parses a status, falling back to `Pending` for anything unrecognised.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in_progress" | "inprogress" => Self::InProgress,
            "completed" | "done" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_lenient(deserializer, Self::parse_lossy)
    }
}

/// Decodes a wire name with `parse`, never failing on a foreign shape.
///
/// Self-describing formats (JSON) may carry `null`, numbers or booleans
/// where a name is expected; those decode as `T::default()`. Compact
/// formats (postcard snapshots) always hold the string we wrote.
fn deserialize_lenient<'de, D, T>(deserializer: D, parse: fn(&str) -> T) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default,
{
    let visitor = LenientName { parse };
    if deserializer.is_human_readable() {
        deserializer.deserialize_any(visitor)
    } else {
        deserializer.deserialize_str(visitor)
    }
}

struct LenientName<T> {
    parse: fn(&str) -> T,
}

impl<'de, T: Default> Visitor<'de> for LenientName<T> {
    type Value = T;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a name")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        Ok((self.parse)(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<T, E> {
        Ok(T::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<T, E> {
        Ok(T::default())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<T, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<T, E> {
        Ok(T::default())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<T, E> {
        Ok(T::default())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<T, E> {
        Ok(T::default())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<T, E> {
        Ok(T::default())
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<T, A::Error> {
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
        Ok(T::default())
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<T, A::Error> {
        while map.next_entry::<de::IgnoredAny, de::IgnoredAny>()?.is_some() {}
        Ok(T::default())
    }
}

/// A user-owned work item.
///
/// `completed_at` is `Some` exactly when `status` is
/// [`TaskStatus::Completed`]; all status changes go through
/// [`Task::set_status`] to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Temporary or permanent identity.
    pub id: TaskId,
    /// Short title, 1..=100 characters.
    pub title: String,
    /// Free-form description, at most 500 characters.
    #[serde(default)]
    pub description: String,
    /// Priority (lenient decoding).
    #[serde(default)]
    pub priority: Priority,
    /// Workflow status (lenient decoding).
    #[serde(default)]
    pub status: TaskStatus,
    /// Grouping label.
    #[serde(default = "default_category")]
    pub category: String,
    /// When the task is due.
    pub due_date: Timestamp,
    /// When the task was created.
    pub created_at: Timestamp,
    /// When the task was last modified.
    pub updated_at: Timestamp,
    /// When the task was completed; `None` unless completed.
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Task {
    /// Builds a fresh pending task from a create payload.
    ///
    /// The payload's creation instant is kept when it is not in the future
    /// relative to `now`; otherwise the task is stamped with `now`.
    #[must_use]
    pub fn from_new(id: TaskId, new: &NewTask, now: Timestamp) -> Self {
        Self {
            id,
            title: new.title.trim().to_string(),
            description: new.description.clone(),
            priority: new.priority,
            status: TaskStatus::Pending,
            category: new
                .category
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(default_category),
            due_date: new.due_date,
            created_at: new.created_at_or(now),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Moves the task to `status`, maintaining `completed_at`.
    ///
    /// Entering `Completed` stamps `completed_at`; re-completing a task that
    /// is already completed keeps the original stamp. Any other status
    /// clears it.
    pub fn set_status(&mut self, status: TaskStatus, now: Timestamp) {
        match status {
            TaskStatus::Completed => {
                if self.status != TaskStatus::Completed || self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            TaskStatus::Pending | TaskStatus::InProgress => self.completed_at = None,
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Applies every field present in `patch`.
    pub fn apply_patch(&mut self, patch: &TaskPatch, now: Timestamp) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = &patch.category {
            self.category = if category.trim().is_empty() {
                default_category()
            } else {
                category.clone()
            };
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(status) = patch.status {
            self.set_status(status, now);
        }
        self.updated_at = now;
    }

    /// Whether the task is still open and its due date has been reached.
    #[must_use]
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status != TaskStatus::Completed && self.due_date <= now
    }
}

/// Payload of a create mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Title, 1..=100 characters.
    pub title: String,
    /// Description, at most 500 characters.
    #[serde(default)]
    pub description: String,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Category; defaults to [`DEFAULT_CATEGORY`].
    #[serde(default)]
    pub category: Option<String>,
    /// Due date; must not be in the past at creation.
    pub due_date: Timestamp,
    /// When the task was created on the originating device.
    ///
    /// Set by clients that queue creates while offline so the server can
    /// judge the due date against the moment the user created the task.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl NewTask {
    /// Creates a payload with the given title and due date and defaults elsewhere.
    pub fn new(title: impl Into<String>, due_date: Timestamp) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            category: None,
            due_date,
            created_at: None,
        }
    }

    /// Records the originating creation instant.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// The creation instant to use when accepting this payload at `now`.
    ///
    /// Claimed instants later than `now` are ignored.
    #[must_use]
    pub fn created_at_or(&self, now: Timestamp) -> Timestamp {
        self.created_at.filter(|c| *c <= now).unwrap_or(now)
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Payload of an update mutation. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New priority.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// New status; `completedAt` follows it.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// New category.
    #[serde(default)]
    pub category: Option<String>,
    /// New due date.
    #[serde(default)]
    pub due_date: Option<Timestamp>,
}

impl TaskPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.category.is_none()
            && self.due_date.is_none()
    }
}

/// Errors raised when a create or update payload is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is empty or whitespace.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Title is longer than [`MAX_TITLE_LENGTH`].
    #[error("task title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Description is longer than [`MAX_DESCRIPTION_LENGTH`].
    #[error("task description too long (max {MAX_DESCRIPTION_LENGTH} characters)")]
    DescriptionTooLong,
    /// Due date lies before the creation instant.
    #[error("due date cannot be in the past")]
    DueDateInPast,
    /// Due date lies after [`LATEST_DUE_DATE`].
    #[error("due date cannot be later than 2200-01-01")]
    DueDateTooFar,
    /// Update carries no fields.
    #[error("update contains no changes")]
    EmptyPatch,
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong);
    }
    Ok(())
}

/// Validates a create payload against the instant of creation.
///
/// The instant is the payload's own `created_at` when present (and not
/// later than `now`), so a create replayed after a long offline period is
/// judged as of when the user made it.
///
/// # Errors
///
/// Returns the first [`ValidationError`] the payload violates.
pub fn validate_new_task(new: &NewTask, now: Timestamp) -> Result<(), ValidationError> {
    validate_title(&new.title)?;
    validate_description(&new.description)?;
    if new.due_date < new.created_at_or(now) {
        return Err(ValidationError::DueDateInPast);
    }
    if new.due_date > LATEST_DUE_DATE {
        return Err(ValidationError::DueDateTooFar);
    }
    Ok(())
}

/// Validates an update payload.
///
/// Due dates are not checked against "now": an existing task may
/// legitimately be moved to a date that has already passed.
///
/// # Errors
///
/// Returns the first [`ValidationError`] the patch violates.
pub fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    if let Some(description) = &patch.description {
        validate_description(description)?;
    }
    if patch.due_date.is_some_and(|due| due > LATEST_DUE_DATE) {
        return Err(ValidationError::DueDateTooFar);
    }
    Ok(())
}
