//! Durable snapshot persistence for the local cache and mutation queue.
//!
//! Defines the [`SnapshotStore`] port the client core writes through,
//! plus two implementations:
//! - [`InMemoryStore`]: non-durable store for tests and ephemeral runs
//! - [`file::FileStore`]: one file per key in a data directory, written
//!   atomically (temp file + rename)
//!
//! The cache and the queue are persisted under separate keys so that one
//! can be rewritten without touching the other.

pub mod file;

use std::collections::HashMap;

use tokio::sync::Mutex;

pub use file::FileStore;

/// Storage key of the local cache snapshot.
pub const CACHE_KEY: &str = "cache";

/// Storage key of the mutation queue snapshot.
pub const QUEUE_KEY: &str = "queue";

/// Errors that can occur during snapshot storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage is full or unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read operation failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// A stored snapshot could not be decoded.
    #[error("corrupt snapshot {key}: {source}")]
    Corrupt {
        /// Key of the unreadable snapshot.
        key: String,
        /// Decoder error.
        source: tasklane_proto::codec::CodecError,
    },

    /// State could not be encoded for storage.
    #[error("encode failed: {0}")]
    Encode(#[from] tasklane_proto::codec::CodecError),
}

/// Key/value persistence port for opaque snapshot bytes.
///
/// Both operations are atomic and durable from the caller's point of view:
/// after `save` returns `Ok`, a subsequent `load` (in this or a later
/// process) returns exactly the saved bytes.
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot stored under `key`, or `None` if nothing was saved yet.
    fn load(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Replace the snapshot stored under `key`.
    fn save(
        &self,
        key: &str,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// In-memory implementation of [`SnapshotStore`].
///
/// Not persistent across processes, but it does survive a
/// [`Replica`](crate::replica::Replica) being dropped and reloaded, which is
/// what restart tests need.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

impl<S: SnapshotStore> SnapshotStore for std::sync::Arc<S> {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).save(key, bytes).await
    }
}
