//! Ordered log of local mutations awaiting server confirmation.
//!
//! Entries are appended at the tail and only ever removed individually,
//! so the relative order of operations on the same task is the order in
//! which the user made them. The queue itself is plain data; durability
//! is provided by [`Replica`](crate::replica::Replica), which persists it
//! after every change.

use serde::{Deserialize, Serialize};

use tasklane_proto::task::{NewTask, TaskId, TaskPatch, Timestamp};

/// Identity of a queued operation.
///
/// `seq` increases strictly with every enqueue (and keeps increasing
/// across restarts, since the counter is persisted with the queue), so
/// ids are totally ordered in enqueue order even if the wall clock jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId {
    /// Per-device sequence number.
    pub seq: u64,
    /// Wall-clock enqueue time in milliseconds.
    pub enqueued_at_ms: u64,
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op-{}@{}", self.seq, self.enqueued_at_ms)
    }
}

/// Kind of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Create a task.
    Create,
    /// Update fields of a task.
    Update,
    /// Delete a task.
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A mutation together with everything needed to replay it remotely.
///
/// The operation references its task by id; it does not own the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create `task` on the server; `task_id` is the local (usually temporary) id.
    Create {
        /// Id the task has locally until the server assigns one.
        task_id: TaskId,
        /// Create payload.
        task: NewTask,
    },
    /// Apply `patch` to the task.
    Update {
        /// Target task.
        task_id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Delete the task.
    Delete {
        /// Target task.
        task_id: TaskId,
    },
}

impl Operation {
    /// The task this operation refers to.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Create { task_id, .. }
            | Self::Update { task_id, .. }
            | Self::Delete { task_id } => task_id,
        }
    }

    /// The kind of this operation.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    fn task_id_mut(&mut self) -> &mut TaskId {
        match self {
            Self::Create { task_id, .. }
            | Self::Update { task_id, .. }
            | Self::Delete { task_id } => task_id,
        }
    }
}

/// An entry in the mutation queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Queue identity.
    pub operation_id: OperationId,
    /// What to replay.
    pub operation: Operation,
    /// When the entry was appended.
    pub enqueued_at: Timestamp,
    /// Number of failed replay attempts so far.
    pub attempts: u32,
    /// Most recent replay failure, if any.
    pub last_error: Option<String>,
}

/// In-memory mutation queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationQueue {
    entries: Vec<PendingOperation>,
    next_seq: u64,
}

impl MutationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `operation` at the tail and returns its id.
    pub fn enqueue(&mut self, operation: Operation, now: Timestamp) -> OperationId {
        let operation_id = OperationId {
            seq: self.next_seq,
            enqueued_at_ms: now.as_millis(),
        };
        self.next_seq = self.next_seq.saturating_add(1);
        self.entries.push(PendingOperation {
            operation_id,
            operation,
            enqueued_at: now,
            attempts: 0,
            last_error: None,
        });
        operation_id
    }

    /// Ordered snapshot of every entry. Does not modify the queue.
    #[must_use]
    pub fn peek_all(&self) -> Vec<PendingOperation> {
        self.entries.clone()
    }

    /// Borrowed view of the entries in order.
    #[must_use]
    pub fn entries(&self) -> &[PendingOperation] {
        &self.entries
    }

    /// Ids of every entry in order.
    #[must_use]
    pub fn ids(&self) -> Vec<OperationId> {
        self.entries.iter().map(|e| e.operation_id).collect()
    }

    /// Current state of one entry.
    #[must_use]
    pub fn get(&self, operation_id: OperationId) -> Option<&PendingOperation> {
        self.entries.iter().find(|e| e.operation_id == operation_id)
    }

    /// Removes one entry. Returns `false` (and does nothing) if absent.
    pub fn remove(&mut self, operation_id: OperationId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.operation_id != operation_id);
        self.entries.len() != before
    }

    /// Removes every entry referring to `task_id`, returning how many went.
    pub fn remove_for_task(&mut self, task_id: &TaskId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.operation.task_id() != task_id);
        before - self.entries.len()
    }

    /// Records a failed replay; returns the new attempt count.
    pub fn record_failure(&mut self, operation_id: OperationId, error: &str) -> Option<u32> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.operation_id == operation_id)?;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_error = Some(error.to_string());
        Some(entry.attempts)
    }

    /// Rewrites every reference to `from` into `to`, returning how many changed.
    pub fn rewrite_task_id(&mut self, from: &TaskId, to: &TaskId) -> usize {
        let mut rewritten = 0;
        for entry in &mut self.entries {
            let task_id = entry.operation.task_id_mut();
            if task_id == from {
                task_id.clone_from(to);
                rewritten += 1;
            }
        }
        rewritten
    }

    /// Whether any entry refers to `task_id`.
    #[must_use]
    pub fn references(&self, task_id: &TaskId) -> bool {
        self.entries.iter().any(|e| e.operation.task_id() == task_id)
    }

    /// Whether a create for `task_id` is still queued.
    #[must_use]
    pub fn has_create_for(&self, task_id: &TaskId) -> bool {
        self.entries.iter().any(|e| {
            e.operation.kind() == OperationKind::Create && e.operation.task_id() == task_id
        })
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the queue. The sequence counter keeps counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
