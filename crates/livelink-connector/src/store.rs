//! Checkpoint persistence via the [`CheckpointStore`] trait.
//!
//! The traversal core hands back opaque checkpoint strings; something has
//! to keep the last committed one across restarts. [`FileCheckpointStore`]
//! writes it as a small JSON record with atomic rename semantics, so a
//! crash mid-write leaves the previous checkpoint intact.
//!
//! ## Disk Layout
//!
//! ```text
//! {path}         # {"checkpoint": "...", "saved_at": "..."}
//! {path}.tmp     # in-flight write, renamed over {path} once synced
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// Fsync a file to ensure its contents are durable on disk.
fn sync_file(path: &Path) -> Result<(), std::io::Error> {
    // Must open with write access for FlushFileBuffers on Windows.
    let f = std::fs::OpenOptions::new().write(true).open(path)?;
    f.sync_all()
}

/// Fsync a directory to make the rename durable.
#[allow(clippy::unnecessary_wraps)] // Returns Result on Unix, no-op elsewhere
fn sync_dir(path: &Path) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        let f = std::fs::File::open(path)?;
        f.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Persistence backend for the last committed checkpoint.
///
/// Implementations must never expose a partially written checkpoint.
pub trait CheckpointStore: Send + Sync {
    /// Loads the last committed checkpoint, or `None` if nothing was ever
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Io` if the backend cannot be read.
    fn load(&self) -> Result<Option<String>, ConnectorError>;

    /// Commits a checkpoint, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Io` if the write fails. The previous
    /// checkpoint stays in place.
    fn save(&self, checkpoint: &str) -> Result<(), ConnectorError>;
}

/// On-disk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCheckpoint {
    checkpoint: String,
    saved_at: DateTime<Utc>,
}

/// Filesystem-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store that keeps its checkpoint at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The checkpoint file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<String>, ConnectorError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let stored: StoredCheckpoint =
            serde_json::from_slice(&data).map_err(std::io::Error::from)?;
        Ok(Some(stored.checkpoint))
    }

    fn save(&self, checkpoint: &str) -> Result<(), ConnectorError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let record = StoredCheckpoint {
            checkpoint: checkpoint.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(std::io::Error::from)?;

        // Write to a temp file, fsync, then rename for atomic durability
        let tmp = self.tmp_path();
        std::fs::write(&tmp, &json)?;
        sync_file(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_dir(parent)?;
        }
        Ok(())
    }
}

/// In-memory checkpoint store that remembers every commit.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    history: Mutex<Vec<String>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose last commit is `checkpoint`.
    #[must_use]
    pub fn with_checkpoint(checkpoint: impl Into<String>) -> Self {
        Self {
            history: Mutex::new(vec![checkpoint.into()]),
        }
    }

    /// Every committed checkpoint, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<String>, ConnectorError> {
        Ok(self.history.lock().last().cloned())
    }

    fn save(&self, checkpoint: &str) -> Result<(), ConnectorError> {
        self.history.lock().push(checkpoint.to_string());
        Ok(())
    }
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<String>, ConnectorError> {
        (**self).load()
    }

    fn save(&self, checkpoint: &str) -> Result<(), ConnectorError> {
        (**self).save(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("livelink.checkpoint"));
        assert!(store.load().unwrap().is_none());

        store.save("2020-01-01 00:00:00,5").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("2020-01-01 00:00:00,5"));

        store
            .save("2020-01-02 00:00:00,6,2020-01-01 00:00:00,3")
            .unwrap();
        assert_eq!(
            store.load().unwrap().as_deref(),
            Some("2020-01-02 00:00:00,6,2020-01-01 00:00:00,3")
        );
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("a").join("b").join("cp.json"));
        store.save(",0").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(",0"));
    }

    #[test]
    fn test_empty_file_is_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, "\n").unwrap();
        assert!(FileCheckpointStore::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileCheckpointStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ConnectorError::Io(_)));
    }

    #[test]
    fn test_memory_store_history() {
        let store = MemoryCheckpointStore::with_checkpoint("a");
        assert_eq!(store.load().unwrap().as_deref(), Some("a"));
        store.save("b").unwrap();
        assert_eq!(store.history(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.load().unwrap().as_deref(), Some("b"));
    }
}
