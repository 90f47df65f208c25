//! Per-page completion hooks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::error::Result;
use crate::fetcher::FetchedPage;
use crate::models::{JobKey, Record};
use crate::storage::{page_key, Storage};

/// Called after each page is merged.
///
/// Handler errors are logged and never fail the page.
#[async_trait]
pub trait PageHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn on_page_completed(
        &self,
        job: &JobKey,
        page: &FetchedPage,
        new_records: &[Record],
    ) -> Result<()>;
}

/// Writes every completed page, as fetched, to storage.
pub struct PageArchiver {
    storage: Arc<dyn Storage>,
}

impl PageArchiver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PageHandler for PageArchiver {
    fn name(&self) -> &str {
        "archive"
    }

    async fn on_page_completed(
        &self,
        job: &JobKey,
        page: &FetchedPage,
        new_records: &[Record],
    ) -> Result<()> {
        let key = page_key(job, page.result.page_number);
        let document = json!({
            "category": job.category,
            "query": job.query,
            "page_number": page.result.page_number,
            "total_count": page.result.total_count,
            "hits_per_page": page.result.hits_per_page,
            "new_records": new_records.len(),
            "records": page.result.records,
            "envelope": page.envelope,
            "archived_at": Utc::now(),
        });
        self.storage.write_json(&key, &document).await?;
        Ok(())
    }
}
