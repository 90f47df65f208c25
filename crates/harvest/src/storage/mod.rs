//! Durable key/value storage for checkpoints and batches.
//!
//! The engine treats storage as a JSON-document store with existence checks.
//! Backends must tolerate concurrent writers to distinct keys; nothing
//! stronger than "last complete write wins" is required.

mod fs;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::JobKey;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors from storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error on {key}: {message}")]
    Serialization { key: String, message: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn serialization(key: &str, err: impl std::fmt::Display) -> Self {
        StorageError::Serialization {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// JSON document store.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Write a document, replacing any previous value under `key`.
    async fn write_json(&self, key: &str, value: &serde_json::Value) -> StorageResult<()>;

    /// Read a document, or `None` if `key` is absent.
    async fn read_json(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;
}

/// `checkpoints/{category}/{query-slug}.json`
pub fn checkpoint_key(job: &JobKey) -> String {
    format!("checkpoints/{}/{}.json", job.category_slug(), job.query_slug())
}

/// `batches/{category}/{query-slug}/pages-{start}-{end}.json`
pub fn batch_key(job: &JobKey, start_page: u32, end_page: u32) -> String {
    format!(
        "batches/{}/{}/pages-{:05}-{:05}.json",
        job.category_slug(),
        job.query_slug(),
        start_page,
        end_page
    )
}

/// `pages/{category}/{query-slug}/page-{n}.json`
pub fn page_key(job: &JobKey, page_number: u32) -> String {
    format!(
        "pages/{}/{}/page-{:05}.json",
        job.category_slug(),
        job.query_slug(),
        page_number
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_scoped_by_job() {
        let job = JobKey::new("Trucks", "ford f150");
        let slug = job.query_slug();
        assert_eq!(checkpoint_key(&job), format!("checkpoints/trucks/{}.json", slug));
        assert_eq!(
            batch_key(&job, 1, 10),
            format!("batches/trucks/{}/pages-00001-00010.json", slug)
        );
        assert_eq!(page_key(&job, 7), format!("pages/trucks/{}/page-00007.json", slug));
    }

    #[test]
    fn test_distinct_queries_never_share_batch_keys() {
        let a = JobKey::new("cars", "ford");
        let b = JobKey::new("cars", "honda");
        assert_ne!(batch_key(&a, 1, 10), batch_key(&b, 1, 10));
    }
}
