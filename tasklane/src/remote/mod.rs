//! Remote API client abstraction.
//!
//! Defines the [`RemoteApi`] trait the sync engine replays queued
//! mutations through. Concrete implementations:
//! - [`http::HttpRemote`]: the REST server over HTTP (reqwest)
//! - [`loopback::LoopbackRemote`]: in-process fake server for tests

pub mod http;
pub mod loopback;

use std::sync::Arc;

use tasklane_proto::task::{NewTask, Task, TaskId, TaskPatch};

/// Errors returned by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a failure envelope or non-success status.
    #[error("server rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message from the failure envelope.
        message: String,
    },

    /// The server answered with a body that does not decode.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Whether the same request may succeed later without changing it.
    ///
    /// Transport failures, malformed bodies, server errors (5xx), request
    /// timeouts (408) and rate limiting (429) are retryable. Other client
    /// errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Malformed(_) => true,
            Self::Rejected { status, .. } => matches!(*status, 408 | 429 | 500..=599),
        }
    }

    /// Whether the server reported that the target does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404, .. })
    }
}

/// Async client for the task server.
///
/// Every call is independent; the server keeps no per-client state.
/// Calls that fail leave the server unchanged as far as the caller can
/// tell, which is what lets the sync engine retry them verbatim.
pub trait RemoteApi: Send + Sync {
    /// Creates a task and returns it with its server-assigned id.
    fn create(
        &self,
        task: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send;

    /// Applies `patch` to task `id` and returns the updated task.
    fn update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send;

    /// Deletes task `id`.
    fn delete(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Lists every task, in the server's ranked order.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Task>, RemoteError>> + Send;

    /// Whether the server is reachable and healthy right now.
    fn health(&self) -> impl std::future::Future<Output = bool> + Send;
}

impl<R: RemoteApi> RemoteApi for Arc<R> {
    fn create(
        &self,
        task: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send {
        (**self).create(task)
    }

    fn update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send {
        (**self).update(id, patch)
    }

    fn delete(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send {
        (**self).delete(id)
    }

    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Task>, RemoteError>> + Send {
        (**self).list()
    }

    fn health(&self) -> impl std::future::Future<Output = bool> + Send {
        (**self).health()
    }
}
