//! Sync engine: replays the mutation queue against the server.
//!
//! The engine is a small state machine ([`SyncState`]) driven by
//! connectivity changes, a periodic timer and manual refresh requests
//! (see [`runner`]). Each trigger that finds the engine online and idle
//! runs one drain pass over a snapshot of the queue:
//!
//! 1. Operations are replayed in queue order. A failure blocks every later
//!    operation on the same task for the rest of the pass, so per-task order
//!    is never violated.
//! 2. A confirmed create is reconciled immediately: the temporary id is
//!    replaced by the server id in the cache and in every queued operation.
//! 3. After the pass, pending markers are cleared for tasks no longer
//!    referenced by the queue; an empty queue also pulls the server listing.
//!
//! The replica lock is never held across a remote call, so local
//! mutations keep flowing while a drain waits on the network.

pub mod runner;

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use tasklane_proto::task::{Task, TaskId, Timestamp};

use crate::queue::{Operation, OperationId, OperationKind, PendingOperation};
use crate::reconcile::{IdentityMapping, reconcile};
use crate::remote::{RemoteApi, RemoteError};
use crate::replica::SharedReplica;
use crate::storage::SnapshotStore;

/// Default period of the background drain timer.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(120);

/// Shortest timer period the runner accepts; shorter ones are raised to it.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of rejections after which an operation is dropped.
pub const DEFAULT_MAX_REJECTIONS: u32 = 3;

/// Default capacity of the [`SyncEvent`] channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Observable state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// The server is not reachable; mutations only queue up.
    Offline,
    /// Online with no drain in progress.
    OnlineIdle,
    /// A drain pass is running.
    Draining,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::OnlineIdle => write!(f, "online"),
            Self::Draining => write!(f, "syncing"),
        }
    }
}

/// Counters describing one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Remote calls started.
    pub attempted: usize,
    /// Operations the server confirmed.
    pub confirmed: usize,
    /// Operations that failed and stay queued.
    pub failed: usize,
    /// Operations dropped after repeated rejection.
    pub rejected: usize,
    /// Operations not attempted (blocked task, or connectivity lost).
    pub skipped: usize,
    /// Whether the cache was replaced from the server listing afterwards.
    pub refreshed: bool,
}

/// Events emitted by the engine for the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The engine moved to a new state.
    StateChanged(SyncState),
    /// A temporary id was replaced by its server id.
    Reconciled {
        /// Client-minted id.
        temporary: TaskId,
        /// Server-assigned id.
        permanent: TaskId,
    },
    /// An operation was dropped after the server kept rejecting it.
    OperationRejected {
        /// The dropped operation.
        operation_id: OperationId,
        /// What it was.
        kind: OperationKind,
        /// The task it referred to.
        task_id: TaskId,
        /// Last rejection message.
        message: String,
    },
    /// A drain pass finished.
    DrainCompleted(DrainReport),
}

/// Tuning knobs for the engine and its runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of the background drain timer.
    pub interval: Duration,
    /// Rejections after which an operation is dropped.
    pub max_rejections: u32,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            max_rejections: DEFAULT_MAX_REJECTIONS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug, Default)]
struct Status {
    online: bool,
    draining: bool,
}

impl Status {
    const fn state(&self) -> SyncState {
        if !self.online {
            SyncState::Offline
        } else if self.draining {
            SyncState::Draining
        } else {
            SyncState::OnlineIdle
        }
    }
}

/// Result of a confirmed remote call.
enum Replayed {
    Created(Task),
    Updated(Task),
    Deleted,
}

/// Drains the mutation queue through a [`RemoteApi`].
///
/// Generic over the snapshot store `S` and the remote `R` so tests can
/// run it against [`InMemoryStore`](crate::storage::InMemoryStore) and
/// [`LoopbackRemote`](crate::remote::loopback::LoopbackRemote).
pub struct SyncEngine<S: SnapshotStore, R: RemoteApi> {
    replica: SharedReplica<S>,
    remote: R,
    config: SyncConfig,
    status: Mutex<Status>,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl<S: SnapshotStore, R: RemoteApi> SyncEngine<S, R> {
    /// Creates an engine that starts out [`SyncState::Offline`].
    ///
    /// Returns the engine and the receiving end of its event channel.
    #[must_use]
    pub fn new(
        replica: SharedReplica<S>,
        remote: R,
        config: SyncConfig,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let engine = Self {
            replica,
            remote,
            config,
            status: Mutex::new(Status::default()),
            event_tx,
        };
        (engine, event_rx)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.status.lock().state()
    }

    /// The remote this engine replays through.
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// The shared replica this engine drains.
    pub const fn replica(&self) -> &SharedReplica<S> {
        &self.replica
    }

    /// Engine configuration.
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn emit(&self, event: SyncEvent) {
        // Best-effort: a slow or absent consumer must not stall syncing.
        if self.event_tx.try_send(event).is_err() {
            tracing::trace!("sync event dropped");
        }
    }

    fn update_status(&self, change: impl FnOnce(&mut Status) -> bool) -> bool {
        let (accepted, before, after) = {
            let mut status = self.status.lock();
            let before = status.state();
            let accepted = change(&mut status);
            (accepted, before, status.state())
        };
        if before != after {
            tracing::info!(from = %before, to = %after, "sync state changed");
            self.emit(SyncEvent::StateChanged(after));
        }
        accepted
    }

    /// Applies a connectivity change.
    ///
    /// Returns `true` when connectivity was just restored, which the caller
    /// should follow with a drain. Losing connectivity during a drain lets
    /// the in-flight call finish but stops the pass before the next one.
    pub fn set_connectivity(&self, online: bool) -> bool {
        self.update_status(|status| {
            let restored = online && !status.online;
            status.online = online;
            restored
        })
    }

    /// Moves `OnlineIdle → Draining`. Fails while offline or already draining.
    pub fn try_begin_drain(&self) -> bool {
        self.update_status(|status| {
            if status.online && !status.draining {
                status.draining = true;
                true
            } else {
                false
            }
        })
    }

    fn finish_drain(&self) {
        self.update_status(|status| {
            status.draining = false;
            true
        });
    }

    fn is_online(&self) -> bool {
        self.status.lock().online
    }

    /// Runs one drain pass if the engine is online and idle.
    ///
    /// Returns `None` when the trigger was coalesced (offline, or a pass is
    /// already running). Never fails: remote and storage errors are logged
    /// and left for the next trigger.
    pub async fn drain(&self) -> Option<DrainReport> {
        if !self.try_begin_drain() {
            tracing::debug!(state = %self.state(), "drain trigger ignored");
            return None;
        }
        let report = self.drain_pass().await;
        self.finish_drain();
        tracing::info!(
            attempted = report.attempted,
            confirmed = report.confirmed,
            failed = report.failed,
            rejected = report.rejected,
            skipped = report.skipped,
            refreshed = report.refreshed,
            "drain pass complete"
        );
        self.emit(SyncEvent::DrainCompleted(report.clone()));
        Some(report)
    }

    async fn drain_pass(&self) -> DrainReport {
        let snapshot = self.replica.lock().await.queue().ids();
        let mut report = DrainReport::default();
        let mut blocked: HashSet<TaskId> = HashSet::new();

        for (index, operation_id) in snapshot.iter().copied().enumerate() {
            if !self.is_online() {
                let remaining = snapshot.len() - index;
                tracing::info!(remaining, "connectivity lost, stopping drain pass");
                report.skipped += remaining;
                break;
            }

            // Re-read: reconciliation may have rewritten the payload, and
            // a local delete may have collapsed the entry away.
            let entry = self.replica.lock().await.queue().get(operation_id).cloned();
            let Some(entry) = entry else {
                continue;
            };
            let task_id = entry.operation.task_id().clone();
            if blocked.contains(&task_id) {
                tracing::debug!(%operation_id, %task_id, "skipping operation behind a failure");
                report.skipped += 1;
                continue;
            }

            report.attempted += 1;
            match self.replay(&entry.operation).await {
                Ok(replayed) => {
                    self.confirm(&entry, replayed).await;
                    report.confirmed += 1;
                }
                Err(error) => {
                    blocked.insert(task_id);
                    if self.fail(&entry, &error).await {
                        report.rejected += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        report.refreshed = self.settle().await;
        report
    }

    async fn replay(&self, operation: &Operation) -> Result<Replayed, RemoteError> {
        match operation {
            Operation::Create { task, .. } => self.remote.create(task).await.map(Replayed::Created),
            Operation::Update { task_id, patch } => self
                .remote
                .update(task_id, patch)
                .await
                .map(Replayed::Updated),
            Operation::Delete { task_id } => match self.remote.delete(task_id).await {
                Ok(()) => Ok(Replayed::Deleted),
                // Already gone is what we wanted.
                Err(e) if e.is_not_found() => Ok(Replayed::Deleted),
                Err(e) => Err(e),
            },
        }
    }

    /// Removes a confirmed entry and folds the server response into the replica.
    async fn confirm(&self, entry: &PendingOperation, replayed: Replayed) {
        let now = Timestamp::now();
        let mut replica = self.replica.lock().await;
        replica.queue_mut().remove(entry.operation_id);
        let (cache, queue) = replica.split_mut();

        match replayed {
            Replayed::Created(server_task) => {
                let mapping = IdentityMapping {
                    temporary: entry.operation.task_id().clone(),
                    permanent: server_task.id.clone(),
                };
                let outcome = reconcile(cache, queue, &mapping);
                let still_queued = queue.references(&mapping.permanent);
                if outcome.cache_rewritten {
                    // Later local edits stay visible until they are confirmed too.
                    if !still_queued {
                        cache.upsert(server_task, now);
                    }
                } else if !still_queued {
                    // Deleted locally while the create was in flight.
                    tracing::info!(
                        task_id = %mapping.permanent,
                        "created task no longer exists locally, queueing delete"
                    );
                    queue.enqueue(
                        Operation::Delete {
                            task_id: mapping.permanent.clone(),
                        },
                        now,
                    );
                }
                tracing::debug!(
                    temporary = %mapping.temporary,
                    permanent = %mapping.permanent,
                    queue_rewritten = outcome.queue_rewritten,
                    "create confirmed"
                );
                self.emit(SyncEvent::Reconciled {
                    temporary: mapping.temporary,
                    permanent: mapping.permanent,
                });
            }
            Replayed::Updated(server_task) => {
                let id = server_task.id.clone();
                if cache.get(&id).is_some() && !queue.references(&id) {
                    cache.upsert(server_task, now);
                }
                tracing::debug!(task_id = %id, "update confirmed");
            }
            Replayed::Deleted => {
                tracing::debug!(task_id = %entry.operation.task_id(), "delete confirmed");
            }
        }

        if let Err(e) = replica.persist().await {
            tracing::warn!(error = %e, "failed to persist confirmed operation");
        }
    }

    /// Records a failed replay. Returns `true` if the operation was dropped.
    async fn fail(&self, entry: &PendingOperation, error: &RemoteError) -> bool {
        let operation_id = entry.operation_id;
        let task_id = entry.operation.task_id();
        let message = error.to_string();
        let mut replica = self.replica.lock().await;
        let attempts = replica
            .queue_mut()
            .record_failure(operation_id, &message)
            .unwrap_or(0);

        let terminal = !error.is_retryable() && attempts >= self.config.max_rejections;
        if !terminal {
            tracing::warn!(%operation_id, %task_id, attempts, error = %message, "replay failed, will retry");
            if let Err(e) = replica.persist_queue().await {
                tracing::warn!(error = %e, "failed to persist retry state");
            }
            return false;
        }

        tracing::warn!(%operation_id, %task_id, attempts, error = %message, "dropping rejected operation");
        let now = Timestamp::now();
        let (cache, queue) = replica.split_mut();
        queue.remove(operation_id);
        if entry.operation.kind() == OperationKind::Create {
            // Nothing queued against a task the server never accepted can succeed.
            let dropped = queue.remove_for_task(task_id);
            cache.remove(task_id, now);
            tracing::debug!(%task_id, dropped, "dropped operations of rejected create");
        }
        if let Err(e) = replica.persist().await {
            tracing::warn!(error = %e, "failed to persist dropped operation");
        }
        drop(replica);

        self.emit(SyncEvent::OperationRejected {
            operation_id,
            kind: entry.operation.kind(),
            task_id: task_id.clone(),
            message,
        });
        true
    }

    /// Clears stale pending markers and, with an empty queue, refreshes the
    /// cache from the server. Returns whether the cache was refreshed.
    async fn settle(&self) -> bool {
        let queue_empty = {
            let mut replica = self.replica.lock().await;
            let (cache, queue) = replica.split_mut();
            let queue_empty = queue.is_empty();
            if queue_empty {
                cache.clear_pending();
            } else {
                cache.retain_pending(|id| queue.references(id));
            }
            if let Err(e) = replica.persist_cache().await {
                tracing::warn!(error = %e, "failed to persist cache after drain");
            }
            queue_empty
        };
        if !queue_empty || !self.is_online() {
            return false;
        }

        let tasks = match self.remote.list().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::debug!(error = %e, "post-drain refresh failed");
                return false;
            }
        };
        let mut replica = self.replica.lock().await;
        // A mutation may have landed while the listing was in flight.
        if !replica.queue().is_empty() {
            return false;
        }
        replica.cache_mut().replace_all(tasks, Timestamp::now());
        if let Err(e) = replica.persist_cache().await {
            tracing::warn!(error = %e, "failed to persist refreshed cache");
        }
        true
    }
}
