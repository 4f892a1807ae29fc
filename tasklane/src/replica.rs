//! The owned local store: cache + queue + the persistence port behind them.
//!
//! There is exactly one [`Replica`] per process. It is shared between the
//! task service and the sync engine as a [`SharedReplica`]; the lock is
//! only ever held for local work and the local snapshot write, never
//! across a remote call.

use std::sync::Arc;

use tokio::sync::Mutex;

use tasklane_proto::codec::{decode_snapshot, encode_snapshot};
use tasklane_proto::task::Timestamp;

use crate::cache::LocalCache;
use crate::queue::{MutationQueue, Operation, OperationId};
use crate::storage::{CACHE_KEY, QUEUE_KEY, SnapshotStore, StoreError};

/// Replica handle shared between the service and the sync engine.
pub type SharedReplica<S> = Arc<Mutex<Replica<S>>>;

/// Local cache and mutation queue with write-through persistence.
///
/// Mutating helpers update the in-memory state first and then persist it.
/// If persistence fails the in-memory state is kept (it stays the source
/// of truth for this process) and the error is returned to the caller.
pub struct Replica<S: SnapshotStore> {
    cache: LocalCache,
    queue: MutationQueue,
    storage: S,
}

impl<S: SnapshotStore> Replica<S> {
    /// Loads both snapshots from `storage`; missing snapshots start empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a snapshot cannot be read or decoded.
    pub async fn load(storage: S) -> Result<Self, StoreError> {
        let cache = match storage.load(CACHE_KEY).await? {
            Some(bytes) => decode_snapshot(&bytes).map_err(|source| StoreError::Corrupt {
                key: CACHE_KEY.to_string(),
                source,
            })?,
            None => LocalCache::new(),
        };
        let queue: MutationQueue = match storage.load(QUEUE_KEY).await? {
            Some(bytes) => decode_snapshot(&bytes).map_err(|source| StoreError::Corrupt {
                key: QUEUE_KEY.to_string(),
                source,
            })?,
            None => MutationQueue::new(),
        };
        tracing::debug!(
            tasks = cache.len(),
            queued = queue.len(),
            "local replica loaded"
        );
        Ok(Self {
            cache,
            queue,
            storage,
        })
    }

    /// Wraps the replica for sharing.
    #[must_use]
    pub fn shared(self) -> SharedReplica<S> {
        Arc::new(Mutex::new(self))
    }

    /// Read access to the cache.
    #[must_use]
    pub const fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Write access to the cache. Call [`persist_cache`](Self::persist_cache) afterwards.
    pub const fn cache_mut(&mut self) -> &mut LocalCache {
        &mut self.cache
    }

    /// Read access to the queue.
    #[must_use]
    pub const fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Write access to the queue. Call [`persist_queue`](Self::persist_queue) afterwards.
    pub const fn queue_mut(&mut self) -> &mut MutationQueue {
        &mut self.queue
    }

    /// Writes the cache snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if encoding or the write fails.
    pub async fn persist_cache(&self) -> Result<(), StoreError> {
        let bytes = encode_snapshot(&self.cache)?;
        self.storage.save(CACHE_KEY, &bytes).await
    }

    /// Writes the queue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if encoding or the write fails.
    pub async fn persist_queue(&self) -> Result<(), StoreError> {
        let bytes = encode_snapshot(&self.queue)?;
        self.storage.save(QUEUE_KEY, &bytes).await
    }

    /// Writes both snapshots. Both writes are attempted; the first error wins.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] encountered.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let cache = self.persist_cache().await;
        let queue = self.persist_queue().await;
        cache.and(queue)
    }

    /// Appends `operation` to the queue and persists it before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the queue could not be persisted; the
    /// operation stays queued in memory.
    pub async fn enqueue(
        &mut self,
        operation: Operation,
        now: Timestamp,
    ) -> Result<OperationId, StoreError> {
        let kind = operation.kind();
        let task_id = operation.task_id().clone();
        let operation_id = self.queue.enqueue(operation, now);
        tracing::debug!(%operation_id, %kind, %task_id, "operation enqueued");
        self.persist_queue().await?;
        Ok(operation_id)
    }

    /// Removes one queue entry (no-op if absent) and persists the queue.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the queue could not be persisted.
    pub async fn remove_operation(&mut self, operation_id: OperationId) -> Result<bool, StoreError> {
        let removed = self.queue.remove(operation_id);
        if removed {
            self.persist_queue().await?;
        }
        Ok(removed)
    }

    /// Empties the queue and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the queue could not be persisted.
    pub async fn clear_queue(&mut self) -> Result<(), StoreError> {
        self.queue.clear();
        self.persist_queue().await
    }

    /// Mutable access to cache and queue at once, for changes that touch both.
    pub const fn split_mut(&mut self) -> (&mut LocalCache, &mut MutationQueue) {
        (&mut self.cache, &mut self.queue)
    }
}
