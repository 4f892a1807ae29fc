//! The mutation front door used by the UI.
//!
//! Every mutation is applied to the cache first (so it renders
//! immediately), queued for the server, persisted, and then the sync
//! engine is nudged.

use tasklane_proto::stats::TaskStats;
use tasklane_proto::task::{
    NewTask, Task, TaskId, TaskPatch, TaskStatus, Timestamp, ValidationError, validate_new_task,
    validate_patch,
};

use crate::queue::Operation;
use crate::ranking;
use crate::replica::SharedReplica;
use crate::storage::{SnapshotStore, StoreError};
use crate::sync::runner::SyncTrigger;

/// Errors surfaced to the UI by [`TaskService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The mutation is invalid and was not applied.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No cached task has this id.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The mutation was applied in memory but could not be persisted.
    #[error("local storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Local task operations backed by the shared replica.
pub struct TaskService<S: SnapshotStore> {
    replica: SharedReplica<S>,
    trigger: Option<SyncTrigger>,
}

impl<S: SnapshotStore> TaskService<S> {
    /// Creates a service that never nudges a sync loop.
    pub const fn new(replica: SharedReplica<S>) -> Self {
        Self {
            replica,
            trigger: None,
        }
    }

    /// Nudges `trigger` after every mutation.
    #[must_use]
    pub fn with_trigger(mut self, trigger: SyncTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// The shared replica.
    pub const fn replica(&self) -> &SharedReplica<S> {
        &self.replica
    }

    fn nudge(&self) {
        if let Some(trigger) = &self.trigger {
            trigger.request();
        }
    }

    /// Creates a task under a fresh temporary id.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] if the payload is invalid (nothing is
    /// applied), [`ServiceError::Storage`] if persisting failed (the task
    /// is still created in memory).
    pub async fn create_task(&self, new: NewTask) -> Result<Task, ServiceError> {
        let now = Timestamp::now();
        validate_new_task(&new, now)?;
        let new = new.with_created_at(now);
        let id = TaskId::new_temporary();
        let task = Task::from_new(id.clone(), &new, now);

        let mut replica = self.replica.lock().await;
        replica.cache_mut().upsert(task.clone(), now);
        replica.cache_mut().mark_pending(&id);
        let queued = replica
            .enqueue(
                Operation::Create {
                    task_id: id.clone(),
                    task: new,
                },
                now,
            )
            .await;
        let cached = replica.persist_cache().await;
        drop(replica);

        tracing::info!(task_id = %id, "task created locally");
        self.nudge();
        queued?;
        cached?;
        Ok(task)
    }

    /// Applies `patch` to task `id`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for an invalid patch,
    /// [`ServiceError::NotFound`] for an unknown id, and
    /// [`ServiceError::Storage`] if persisting failed.
    pub async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, ServiceError> {
        validate_patch(&patch)?;
        let now = Timestamp::now();

        let mut replica = self.replica.lock().await;
        let cache = replica.cache_mut();
        let task = cache
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        task.apply_patch(&patch, now);
        let updated = task.clone();
        cache.recompute_stats(now);
        cache.mark_pending(id);
        let queued = replica
            .enqueue(
                Operation::Update {
                    task_id: id.clone(),
                    patch,
                },
                now,
            )
            .await;
        let cached = replica.persist_cache().await;
        drop(replica);

        tracing::info!(task_id = %id, "task updated locally");
        self.nudge();
        queued?;
        cached?;
        Ok(updated)
    }

    /// Marks task `id` completed.
    ///
    /// # Errors
    ///
    /// See [`update_task`](Self::update_task).
    pub async fn complete_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        self.update_task(id, TaskPatch::status(TaskStatus::Completed))
            .await
    }

    /// Moves task `id` back to pending.
    ///
    /// # Errors
    ///
    /// See [`update_task`](Self::update_task).
    pub async fn reopen_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        self.update_task(id, TaskPatch::status(TaskStatus::Pending))
            .await
    }

    /// Deletes task `id`.
    ///
    /// A task the server has never confirmed is removed locally together
    /// with every queued operation on it; nothing is sent.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] for an unknown id and
    /// [`ServiceError::Storage`] if persisting failed.
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), ServiceError> {
        let now = Timestamp::now();
        let mut replica = self.replica.lock().await;
        if replica.cache_mut().remove(id, now).is_none() {
            return Err(ServiceError::NotFound(id.clone()));
        }

        let queued = if id.is_temporary() {
            let dropped = replica.queue_mut().remove_for_task(id);
            tracing::info!(task_id = %id, dropped, "unsynced task deleted locally");
            replica.persist_queue().await.map(|()| None)
        } else {
            replica
                .enqueue(
                    Operation::Delete {
                        task_id: id.clone(),
                    },
                    now,
                )
                .await
                .map(Some)
        };
        let cached = replica.persist_cache().await;
        drop(replica);

        if matches!(queued, Ok(Some(_))) {
            tracing::info!(task_id = %id, "task deleted locally");
            self.nudge();
        }
        queued?;
        cached?;
        Ok(())
    }

    /// Cached tasks in ranked order as of `now`.
    pub async fn ranked_tasks(&self, now: Timestamp) -> Vec<Task> {
        let replica = self.replica.lock().await;
        ranking::rank(replica.cache().tasks(), now)
    }

    /// Statistics over the cached tasks as of `now`.
    pub async fn stats(&self, now: Timestamp) -> TaskStats {
        let replica = self.replica.lock().await;
        TaskStats::compute(replica.cache().tasks(), now)
    }

    /// One cached task.
    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        self.replica.lock().await.cache().get(id).cloned()
    }

    /// Whether task `id` has local changes the server has not confirmed.
    pub async fn is_pending(&self, id: &TaskId) -> bool {
        self.replica.lock().await.cache().is_pending(id)
    }

    /// Number of queued operations.
    pub async fn queued_operations(&self) -> usize {
        self.replica.lock().await.queue().len()
    }
}
