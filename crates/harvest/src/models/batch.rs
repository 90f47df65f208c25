//! Batches of completed pages awaiting durable storage.

use serde::{Deserialize, Serialize};

use super::Record;

/// Accumulation buffer for the records of completed pages.
///
/// `pages` is kept sorted and `records` follows page order, with
/// `record_counts[i]` records belonging to `pages[i]`. `records` holds only
/// the records that were new when their page was merged, so the union of all
/// batches is the deduplicated result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub pages: Vec<u32>,
    pub record_counts: Vec<usize>,
    pub records: Vec<Record>,
}

impl Batch {
    /// Insert a page's records at its position in page order.
    ///
    /// Returns false if the page is already present.
    pub fn insert_page(&mut self, page: u32, records: Vec<Record>) -> bool {
        let index = match self.pages.binary_search(&page) {
            Ok(_) => return false,
            Err(index) => index,
        };
        let offset: usize = self.record_counts.iter().take(index).sum();
        let offset = offset.min(self.records.len());
        let count = records.len();
        self.records.splice(offset..offset, records);
        self.pages.insert(index, page);
        let at = index.min(self.record_counts.len());
        self.record_counts.insert(at, count);
        true
    }

    pub fn start_page(&self) -> Option<u32> {
        self.pages.first().copied()
    }

    pub fn end_page(&self) -> Option<u32> {
        self.pages.last().copied()
    }

    /// Page range after adding `page`.
    pub fn range_with(&self, page: u32) -> (u32, u32) {
        match (self.start_page(), self.end_page()) {
            (Some(start), Some(end)) => (start.min(page), end.max(page)),
            _ => (page, page),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Reference to a batch that has been flushed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHandle {
    /// Storage key the batch was written under.
    pub key: String,
    pub start_page: u32,
    pub end_page: u32,
    /// Completed pages contained in the batch.
    pub pages: Vec<u32>,
    pub record_count: usize,
}

impl BatchHandle {
    /// Whether `page` lies within the batch's page range.
    pub fn covers(&self, page: u32) -> bool {
        (self.start_page..=self.end_page).contains(&page)
    }

    /// Whether the range `[start, end]` intersects the batch's range.
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        start <= self.end_page && self.start_page <= end
    }
}
