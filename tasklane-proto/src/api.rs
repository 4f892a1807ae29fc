//! HTTP wire envelope and route paths for the Tasklane CRUD API.

use serde::{Deserialize, Serialize};

/// Health check route.
pub const HEALTH_PATH: &str = "/health";

/// Collection route for tasks.
pub const TASKS_PATH: &str = "/api/tasks";

/// Statistics route.
pub const STATS_PATH: &str = "/api/tasks/stats";

/// Uniform response envelope returned by every API route.
///
/// `success = false` always carries a human-readable `message`; `data`
/// is present only on success for routes that return a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was accepted.
    pub success: bool,
    /// Response payload.
    pub data: Option<T>,
    /// Human-readable outcome.
    #[serde(default)]
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `data`.
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    /// A failed response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
        }
    }
}

/// Path of a single task resource.
#[must_use]
pub fn task_path(id: &str) -> String {
    format!("{TASKS_PATH}/{id}")
}
