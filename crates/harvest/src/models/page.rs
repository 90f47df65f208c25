//! Fetched result pages.

use serde::{Deserialize, Serialize};

use super::Record;

/// One fetched page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_number: u32,
    pub records: Vec<Record>,
    /// Total result count reported upstream. May be absent or stale.
    pub total_count: Option<u64>,
    pub hits_per_page: Option<u32>,
}

impl PageResult {
    pub fn new(page_number: u32, records: Vec<Record>) -> Self {
        Self {
            page_number,
            records,
            total_count: None,
            hits_per_page: None,
        }
    }

    pub fn with_totals(mut self, total_count: Option<u64>, hits_per_page: Option<u32>) -> Self {
        self.total_count = total_count;
        self.hits_per_page = hits_per_page;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Page count implied by this page's totals, before any cap.
    ///
    /// Returns `None` when the upstream did not report enough to tell.
    pub fn reported_pages(&self) -> Option<u32> {
        if self.total_count == Some(0) {
            return Some(1);
        }
        let hits = self
            .hits_per_page
            .filter(|h| *h > 0)
            .or_else(|| u32::try_from(self.records.len()).ok().filter(|n| *n > 0))?;

        match self.total_count {
            Some(total) => {
                let pages = total.div_ceil(u64::from(hits)).max(1);
                Some(u32::try_from(pages).unwrap_or(u32::MAX))
            }
            None if self.records.len() < hits as usize => Some(1),
            None => None,
        }
    }
}

/// `min(ceil(total / hitsPerPage), max_pages)`, never below 1.
///
/// An unknown page count falls back to `max_pages`.
pub fn derive_total_pages(reported: Option<u32>, max_pages: u32) -> u32 {
    let cap = max_pages.max(1);
    reported.unwrap_or(cap).clamp(1, cap)
}
