//! Batch assembly: grouping completed pages for durable storage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::models::{Batch, JobKey, Record};
use crate::storage::{batch_key, Storage, StorageError};

pub use crate::models::BatchHandle;

/// Stored form of a flushed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDocument {
    pub category: String,
    pub query: String,
    pub start_page: u32,
    pub end_page: u32,
    pub pages: Vec<u32>,
    #[serde(default)]
    pub record_counts: Vec<usize>,
    pub record_count: usize,
    pub records: Vec<Record>,
    pub flushed_at: DateTime<Utc>,
}

impl BatchDocument {
    fn into_batch(self) -> Batch {
        Batch {
            pages: self.pages,
            record_counts: self.record_counts,
            records: self.records,
        }
    }
}

/// Groups completed pages into fixed-size batches.
#[derive(Clone)]
pub struct BatchAssembler {
    batch_size: usize,
    storage: Arc<dyn Storage>,
}

impl BatchAssembler {
    pub fn new(batch_size: usize, storage: Arc<dyn Storage>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            storage,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Add a completed page and the records it contributed, in page order.
    ///
    /// A page already in the batch is ignored.
    pub fn append(&self, batch: &mut Batch, page_number: u32, records: Vec<Record>) {
        batch.insert_page(page_number, records);
    }

    pub fn is_full(&self, batch: &Batch) -> bool {
        batch.page_count() >= self.batch_size
    }

    /// Write a batch to storage.
    ///
    /// The key depends only on the job and the batch's page range, so
    /// re-flushing the same batch overwrites it.
    pub async fn flush(&self, job: &JobKey, batch: &Batch) -> Result<BatchHandle> {
        let (start_page, end_page) = match (batch.start_page(), batch.end_page()) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(HarvestError::Unrecoverable(format!(
                    "[{}] refusing to flush an empty batch",
                    job
                )))
            }
        };

        let key = batch_key(job, start_page, end_page);
        let document = BatchDocument {
            category: job.category.clone(),
            query: job.query.clone(),
            start_page,
            end_page,
            pages: batch.pages.clone(),
            record_counts: batch.record_counts.clone(),
            record_count: batch.records.len(),
            records: batch.records.clone(),
            flushed_at: Utc::now(),
        };
        let value =
            serde_json::to_value(&document).map_err(|e| StorageError::serialization(&key, e))?;
        self.storage.write_json(&key, &value).await?;

        debug!(
            "[{}] Flushed batch {} (pages {}-{}, {} records)",
            job,
            key,
            start_page,
            end_page,
            document.record_count
        );

        Ok(BatchHandle {
            key,
            start_page,
            end_page,
            pages: document.pages,
            record_count: document.record_count,
        })
    }

    /// Add a page to an already flushed batch whose range covers it.
    ///
    /// The range is unchanged, so the batch is rewritten under its own key.
    pub async fn amend(
        &self,
        job: &JobKey,
        handle: &BatchHandle,
        page_number: u32,
        records: Vec<Record>,
    ) -> Result<BatchHandle> {
        if !handle.covers(page_number) {
            return Err(HarvestError::Unrecoverable(format!(
                "[{}] page {} is outside batch {}",
                job, page_number, handle.key
            )));
        }
        let Some(document) = self.load(handle).await? else {
            return Err(HarvestError::Unrecoverable(format!(
                "[{}] batch {} is missing from storage",
                job, handle.key
            )));
        };

        let mut batch = document.into_batch();
        self.append(&mut batch, page_number, records);
        self.flush(job, &batch).await
    }

    /// Read a flushed batch back.
    pub async fn load(&self, handle: &BatchHandle) -> Result<Option<BatchDocument>> {
        let Some(value) = self.storage.read_json(&handle.key).await? else {
            return Ok(None);
        };
        let document =
            serde_json::from_value(value).map_err(|e| StorageError::serialization(&handle.key, e))?;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn records(ids: &[&str]) -> Vec<Record> {
        ids.iter().map(|id| Record::with_id(*id, json!({"id": id}))).collect()
    }

    #[test]
    fn test_full_at_batch_size() {
        let assembler = BatchAssembler::new(2, Arc::new(MemoryStorage::new()));
        let mut batch = Batch::default();
        assembler.append(&mut batch, 1, records(&["a"]));
        assert!(!assembler.is_full(&batch));
        assembler.append(&mut batch, 2, records(&["b", "c"]));
        assert!(assembler.is_full(&batch));
        assert_eq!(batch.records.len(), 3);
    }

    #[test]
    fn test_append_same_page_twice_is_ignored() {
        let assembler = BatchAssembler::new(5, Arc::new(MemoryStorage::new()));
        let mut batch = Batch::default();
        assembler.append(&mut batch, 3, records(&["a"]));
        assembler.append(&mut batch, 3, records(&["a"]));
        assert_eq!(batch.pages, vec![3]);
        assert_eq!(batch.records.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_writes_and_loads() {
        let storage = MemoryStorage::new();
        let assembler = BatchAssembler::new(3, Arc::new(storage.clone()));
        let job = JobKey::new("cars", "ford");
        let mut batch = Batch::default();
        assembler.append(&mut batch, 1, records(&["a"]));
        assembler.append(&mut batch, 2, records(&["b"]));

        let handle = assembler.flush(&job, &batch).await.unwrap();
        assert_eq!(handle.key, batch_key(&job, 1, 2));
        assert_eq!(handle.pages, vec![1, 2]);
        assert_eq!(handle.record_count, 2);

        let document = assembler.load(&handle).await.unwrap().unwrap();
        assert_eq!(document.records, batch.records);
    }

    #[tokio::test]
    async fn test_reflush_overwrites() {
        let storage = MemoryStorage::new();
        let assembler = BatchAssembler::new(3, Arc::new(storage.clone()));
        let job = JobKey::new("cars", "ford");
        let mut batch = Batch::default();
        assembler.append(&mut batch, 4, records(&["a"]));
        assembler.append(&mut batch, 5, records(&["b"]));

        assembler.flush(&job, &batch).await.unwrap();
        assembler.flush(&job, &batch).await.unwrap();
        assert_eq!(storage.keys_with_prefix("batches/").await.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_range_follows_sorted_pages() {
        let storage = MemoryStorage::new();
        let assembler = BatchAssembler::new(5, Arc::new(storage.clone()));
        let job = JobKey::new("cars", "ford");
        let mut batch = Batch::default();
        assembler.append(&mut batch, 8, records(&["h"]));
        assembler.append(&mut batch, 5, records(&["e"]));
        assembler.append(&mut batch, 9, records(&["i"]));

        let handle = assembler.flush(&job, &batch).await.unwrap();
        assert_eq!(handle.key, batch_key(&job, 5, 9));
        assert_eq!(handle.pages, vec![5, 8, 9]);
    }

    #[tokio::test]
    async fn test_amend_inserts_page_into_covering_batch() {
        let storage = MemoryStorage::new();
        let assembler = BatchAssembler::new(3, Arc::new(storage.clone()));
        let job = JobKey::new("cars", "ford");
        let mut batch = Batch::default();
        assembler.append(&mut batch, 4, records(&["d"]));
        assembler.append(&mut batch, 6, records(&["f"]));
        let handle = assembler.flush(&job, &batch).await.unwrap();

        let amended = assembler.amend(&job, &handle, 5, records(&["e"])).await.unwrap();
        assert_eq!(amended.key, handle.key);
        assert_eq!(amended.pages, vec![4, 5, 6]);
        assert_eq!(storage.keys_with_prefix("batches/").await.len(), 1);

        let document = assembler.load(&amended).await.unwrap().unwrap();
        let ids: Vec<&str> = document.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "e", "f"]);

        assert!(assembler.amend(&job, &amended, 9, records(&["x"])).await.is_err());
    }

    #[tokio::test]
    async fn test_flush_empty_batch_fails() {
        let assembler = BatchAssembler::new(3, Arc::new(MemoryStorage::new()));
        let result = assembler.flush(&JobKey::new("c", "q"), &Batch::default()).await;
        assert!(result.is_err());
    }
}
