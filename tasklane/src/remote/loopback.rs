//! In-process fake server for testing.
//!
//! [`LoopbackRemote`] keeps an authoritative task map in memory and
//! applies the same validation and patch rules as the real server. Tests
//! can script failures, choose the ids it assigns, take it offline, and
//! inspect the calls it received.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use tasklane_proto::task::{
    NewTask, Task, TaskId, TaskPatch, Timestamp, validate_new_task, validate_patch,
};

use super::{RemoteApi, RemoteError};

/// A call received by the loopback server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `create` with its payload.
    Create(NewTask),
    /// `update` with target and patch.
    Update(TaskId, TaskPatch),
    /// `delete` with target.
    Delete(TaskId),
    /// `list`.
    List,
}

type CallHook = Box<dyn Fn(&RemoteCall) + Send + Sync>;

#[derive(Default)]
struct LoopbackState {
    tasks: BTreeMap<TaskId, Task>,
    assign_ids: VecDeque<TaskId>,
    /// Outcomes for upcoming mutating calls; `None` lets the call through.
    script: VecDeque<Option<RemoteError>>,
    calls: Vec<RemoteCall>,
    unreachable: bool,
}

/// [`RemoteApi`] backed by an in-memory task map.
#[derive(Default)]
pub struct LoopbackRemote {
    state: Mutex<LoopbackState>,
    hook: Mutex<Option<CallHook>>,
}

impl LoopbackRemote {
    /// Creates an empty, reachable server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `id` as the next id handed out by `create`.
    pub fn assign_next_id(&self, id: impl Into<String>) {
        self.state.lock().assign_ids.push_back(TaskId::new(id));
    }

    /// Makes the next not-yet-scripted mutating call fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().script.push_back(Some(error));
    }

    /// Lets the next not-yet-scripted mutating call through.
    pub fn pass_next(&self) {
        self.state.lock().script.push_back(None);
    }

    /// Takes the server on or off the network.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Registers a callback run after every recorded call.
    pub fn on_call(&self, hook: impl Fn(&RemoteCall) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Number of mutating calls received so far.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| !matches!(c, RemoteCall::List))
            .count()
    }

    /// The server's copy of task `id`.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    /// Every task the server holds, ordered by id.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.values().cloned().collect()
    }

    /// Inserts a task directly into the server store.
    pub fn seed(&self, task: Task) {
        self.state.lock().tasks.insert(task.id.clone(), task);
    }

    /// Records `call` and decides whether it goes through.
    ///
    /// Calls made while unreachable are not recorded and skip the hook.
    fn admit(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let outcome = {
            let mut state = self.state.lock();
            if state.unreachable {
                return Err(RemoteError::Transport("server unreachable".to_string()));
            }
            state.calls.push(call.clone());
            if matches!(call, RemoteCall::List) {
                Ok(())
            } else {
                state.script.pop_front().flatten().map_or(Ok(()), Err)
            }
        };
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(&call);
        }
        outcome
    }
}

fn bad_request(message: impl std::fmt::Display) -> RemoteError {
    RemoteError::Rejected {
        status: 400,
        message: message.to_string(),
    }
}

fn not_found(id: &TaskId) -> RemoteError {
    RemoteError::Rejected {
        status: 404,
        message: format!("task {id} not found"),
    }
}

impl RemoteApi for LoopbackRemote {
    async fn create(&self, task: &NewTask) -> Result<Task, RemoteError> {
        self.admit(RemoteCall::Create(task.clone()))?;
        let now = Timestamp::now();
        validate_new_task(task, now).map_err(bad_request)?;
        let mut state = self.state.lock();
        let id = state
            .assign_ids
            .pop_front()
            .unwrap_or_else(TaskId::new_permanent);
        let created = Task::from_new(id.clone(), task, now);
        state.tasks.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, RemoteError> {
        self.admit(RemoteCall::Update(id.clone(), patch.clone()))?;
        validate_patch(patch).map_err(bad_request)?;
        let mut state = self.state.lock();
        let task = state.tasks.get_mut(id).ok_or_else(|| not_found(id))?;
        task.apply_patch(patch, Timestamp::now());
        Ok(task.clone())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.admit(RemoteCall::Delete(id.clone()))?;
        self.state
            .lock()
            .tasks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn list(&self) -> Result<Vec<Task>, RemoteError> {
        self.admit(RemoteCall::List)?;
        let tasks = self.tasks();
        Ok(crate::ranking::rank(&tasks, Timestamp::now()))
    }

    async fn health(&self) -> bool {
        !self.state.lock().unreachable
    }
}
