//! Filesystem storage backend.
//!
//! Keys map to relative paths under a root directory. Writes land in a
//! temporary sibling first and are then renamed into place, so a crash
//! mid-write leaves the previous document intact.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::{Storage, StorageError, StorageResult};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// JSON documents stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, rejecting anything that could
    /// escape it.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::Backend("empty storage key".to_string()));
        }
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(StorageError::Backend(format!(
                "storage key escapes root: {}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(key, e))
    }

    async fn write_json(&self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }

        let body = serde_json::to_vec_pretty(value).map_err(|e| StorageError::serialization(key, e))?;

        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{}", std::process::id(), n));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| io_error(key, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(key, e));
        }

        debug!("Wrote {} ({} bytes)", path.display(), body.len());
        Ok(())
    }

    async fn read_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(key, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::serialization(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_creates_directories() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());

        storage
            .write_json("checkpoints/cars/ford.json", &json!({"page": 3}))
            .await
            .unwrap();

        assert!(dir.path().join("checkpoints/cars/ford.json").exists());
        assert!(storage.exists("checkpoints/cars/ford.json").await.unwrap());
        assert_eq!(
            storage.read_json("checkpoints/cars/ford.json").await.unwrap(),
            Some(json!({"page": 3}))
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        assert!(!storage.exists("nope.json").await.unwrap());
        assert_eq!(storage.read_json("nope.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        storage.write_json("a/b.json", &json!(1)).await.unwrap();
        storage.write_json("a/b.json", &json!(2)).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("b.json")]);
        assert_eq!(storage.read_json("a/b.json").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path());
        assert!(storage.write_json("../escape.json", &json!(1)).await.is_err());
        assert!(storage.write_json("/abs.json", &json!(1)).await.is_err());
        assert!(storage.read_json("a/../../b.json").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        let storage = FsStorage::new(dir.path());
        assert!(matches!(
            storage.read_json("bad.json").await,
            Err(StorageError::Serialization { .. })
        ));
    }
}
