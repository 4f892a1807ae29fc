//! HTTP routes, handlers and the server entry points.
//!
//! Every route answers with the [`ApiResponse`] envelope. Creates are
//! validated as of the payload's own creation instant, so a client that
//! replays a create queued while offline is not rejected merely because
//! the due date has since passed.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tasklane_proto::api::{ApiResponse, HEALTH_PATH, STATS_PATH, TASKS_PATH};
use tasklane_proto::stats::TaskStats;
use tasklane_proto::task::{
    NewTask, Task, TaskId, TaskPatch, Timestamp, ValidationError, validate_new_task,
    validate_patch,
};

use crate::ranking::rank_tasks;
use crate::store::TaskStore;

/// Shared server state.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Task table.
    pub store: TaskStore,
}

impl ServerState {
    /// Creates a state with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

type SharedState = Arc<ServerState>;

/// Errors a handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The request body could not be decoded.
    #[error("invalid request body: {0}")]
    BadRequest(String),
    /// No task with this id.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// No such route.
    #[error("route not found")]
    NoRoute,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::NoRoute => StatusCode::NOT_FOUND,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ApiResponse::<serde_json::Value>::error(self.to_string());
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

async fn health() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::ok(
        serde_json::json!({ "status": "ok" }),
        "Tasklane API is running",
    ))
}

async fn list_tasks(State(state): State<SharedState>) -> ApiResult<Vec<Task>> {
    let tasks = rank_tasks(state.store.all().await, Timestamp::now());
    let message = format!("{} task(s)", tasks.len());
    Ok(Json(ApiResponse::ok(tasks, message)))
}

async fn task_stats(State(state): State<SharedState>) -> ApiResult<TaskStats> {
    let tasks = state.store.all().await;
    let stats = TaskStats::compute(&tasks, Timestamp::now());
    Ok(Json(ApiResponse::ok(stats, "statistics")))
}

async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Task> {
    let id = TaskId::new(id);
    let task = state.store.get(&id).await.ok_or(ApiError::NotFound(id))?;
    Ok(Json(ApiResponse::ok(task, "task found")))
}

async fn create_task(
    State(state): State<SharedState>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), ApiError> {
    let Json(new) = payload?;
    let now = Timestamp::now();
    validate_new_task(&new, now)?;

    let task = Task::from_new(TaskId::new_permanent(), &new, now);
    state.store.insert(task.clone()).await;
    tracing::info!(task_id = %task.id, "task created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(task, "task created")),
    ))
}

async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult<Task> {
    let Json(patch) = payload?;
    validate_patch(&patch)?;

    let id = TaskId::new(id);
    let task = state
        .store
        .update(&id, &patch, Timestamp::now())
        .await
        .ok_or(ApiError::NotFound(id))?;
    tracing::info!(task_id = %task.id, "task updated");
    Ok(Json(ApiResponse::ok(task, "task updated")))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<TaskId> {
    let id = TaskId::new(id);
    let removed = state
        .store
        .remove(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;
    tracing::info!(task_id = %removed.id, "task deleted");
    Ok(Json(ApiResponse::ok(id, "task deleted")))
}

async fn no_route() -> ApiError {
    ApiError::NoRoute
}

/// Builds the application router over `state`.
pub fn router(state: SharedState) -> axum::Router {
    let item = format!("{TASKS_PATH}/{{id}}");
    axum::Router::new()
        .route(HEALTH_PATH, get(health))
        .route(TASKS_PATH, get(list_tasks).post(create_task))
        .route(STATS_PATH, get(task_stats))
        .route(&item, get(get_task).put(update_task).delete(delete_task))
        .fallback(no_route)
        .with_state(state)
}

/// Starts the server on `addr` with an empty store.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-built [`ServerState`] and returns the bound
/// address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: SharedState,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
