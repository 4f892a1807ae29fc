//! REST client for the task server.

use std::time::Duration;

use serde::de::DeserializeOwned;

use tasklane_proto::api::{ApiResponse, HEALTH_PATH, TASKS_PATH, task_path};
use tasklane_proto::task::{NewTask, Task, TaskId, TaskPatch};

use super::{RemoteApi, RemoteError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest slice of an error body kept in logs and error messages.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// [`RemoteApi`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Creates a client for the server at `base_url` (e.g. `http://127.0.0.1:3000`).
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok((status, body))
    }

    /// Decodes an envelope, mapping failure envelopes and statuses to errors.
    fn parse<T: DeserializeOwned>(status: u16, body: &str) -> Result<Option<T>, RemoteError> {
        let envelope = serde_json::from_str::<ApiResponse<T>>(body);
        if !(200..300).contains(&status) {
            let message = match envelope {
                Ok(envelope) if !envelope.message.is_empty() => envelope.message,
                _ => truncate(body),
            };
            tracing::debug!(status, message = %message, "request rejected");
            return Err(RemoteError::Rejected { status, message });
        }
        let envelope = envelope.map_err(|e| {
            tracing::warn!(status, error = %e, body = %truncate(body), "undecodable response");
            RemoteError::Malformed(e.to_string())
        })?;
        if !envelope.success {
            return Err(RemoteError::Rejected {
                status,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }

    fn require<T>(data: Option<T>) -> Result<T, RemoteError> {
        data.ok_or_else(|| RemoteError::Malformed("response envelope carried no data".to_string()))
    }
}

fn truncate(body: &str) -> String {
    let mut preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}

impl RemoteApi for HttpRemote {
    async fn create(&self, task: &NewTask) -> Result<Task, RemoteError> {
        let (status, body) = self
            .send(self.client.post(self.url(TASKS_PATH)).json(task))
            .await?;
        Self::require(Self::parse(status, &body)?)
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, RemoteError> {
        let (status, body) = self
            .send(self.client.put(self.url(&task_path(id.as_str()))).json(patch))
            .await?;
        Self::require(Self::parse(status, &body)?)
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let (status, body) = self
            .send(self.client.delete(self.url(&task_path(id.as_str()))))
            .await?;
        Self::parse::<serde_json::Value>(status, &body).map(|_| ())
    }

    async fn list(&self) -> Result<Vec<Task>, RemoteError> {
        let (status, body) = self.send(self.client.get(self.url(TASKS_PATH))).await?;
        Self::require(Self::parse(status, &body)?)
    }

    async fn health(&self) -> bool {
        match self.send(self.client.get(self.url(HEALTH_PATH))).await {
            Ok((status, body)) => Self::parse::<serde_json::Value>(status, &body).is_ok(),
            Err(e) => {
                tracing::trace!(error = %e, "health probe failed");
                false
            }
        }
    }
}
