//! File-backed [`SnapshotStore`].

use std::path::{Path, PathBuf};

use super::{SnapshotStore, StoreError};

/// Stores each key as `<data_dir>/<key>.bin`.
///
/// Writes go to `<key>.bin.tmp` first and are then renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshot files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl SnapshotStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadFailed(format!("{}: {e}", path.display()))),
        }
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", self.dir.display())))?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.bin.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("{}: {e}", target.display())))?;

        tracing::trace!(key, bytes = bytes.len(), "snapshot written");
        Ok(())
    }
}
