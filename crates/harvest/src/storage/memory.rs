//! In-memory storage backend.
//!
//! Used by tests and dry runs. Contents are lost when the process exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageError, StorageResult};

/// `RwLock<HashMap>`-backed document store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let documents = self.documents.read().await;
        let mut keys: Vec<String> = documents.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stored keys under `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .await
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.documents.read().await.contains_key(key))
    }

    async fn write_json(&self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("write rejected: {}", key)));
        }
        let mut documents = self.documents.write().await;
        documents.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn read_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        Ok(self.documents.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_then_read() {
        let storage = MemoryStorage::new();
        assert!(!storage.exists("a").await.unwrap());

        storage.write_json("a", &json!({"n": 1})).await.unwrap();
        assert!(storage.exists("a").await.unwrap());
        assert_eq!(storage.read_json("a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(storage.read_json("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let storage = MemoryStorage::new();
        storage.write_json("a", &json!(1)).await.unwrap();
        storage.write_json("a", &json!(2)).await.unwrap();
        assert_eq!(storage.len().await, 1);
        assert_eq!(storage.read_json("a").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        other.write_json("b/2", &json!(null)).await.unwrap();
        storage.write_json("b/1", &json!(null)).await.unwrap();
        assert_eq!(storage.keys_with_prefix("b/").await, vec!["b/1", "b/2"]);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.write_json("a", &json!(1)).await.is_err());
        storage.set_fail_writes(false);
        assert!(storage.write_json("a", &json!(1)).await.is_ok());
    }
}
