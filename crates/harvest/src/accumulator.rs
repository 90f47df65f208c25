//! Accumulation and deduplication of harvested records.

use std::collections::HashSet;

use crate::models::{PageResult, Record};

/// Summary of merging one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Records that were not already present, in page order.
    pub new_records: Vec<Record>,
    pub duplicates: usize,
}

impl MergeOutcome {
    pub fn merged_count(&self) -> usize {
        self.new_records.len()
    }

    /// A non-empty page that contributed nothing new.
    ///
    /// Usually the upstream looping back to content it already served.
    pub fn is_stalled(&self) -> bool {
        self.new_records.is_empty() && self.duplicates > 0
    }
}

/// Running, deduplicated result set for one job.
///
/// Records keep arrival order (page order, then within-page order). The
/// first copy of an identity wins.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    seen: HashSet<String>,
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from previously accepted records, e.g. on resume.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut set = Self::new();
        set.extend(records);
        set
    }

    /// Merge a page, returning the new records and the duplicate count.
    pub fn merge(&mut self, page: &PageResult) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for record in &page.records {
            if self.seen.insert(record.id.clone()) {
                self.records.push(record.clone());
                outcome.new_records.push(record.clone());
            } else {
                outcome.duplicates += 1;
            }
        }
        outcome
    }

    /// Add records, skipping identities already present. Returns how many
    /// were added.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(record.id.clone()) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(number: u32, ids: &[(&str, &str)]) -> PageResult {
        let records = ids
            .iter()
            .map(|(id, tag)| Record::with_id(*id, json!({"id": id, "tag": tag})))
            .collect();
        PageResult::new(number, records)
    }

    #[test]
    fn test_merge_counts_new_records() {
        let mut set = ResultSet::new();
        let outcome = set.merge(&page(1, &[("a", "1"), ("b", "1")]));
        assert_eq!(outcome.merged_count(), 2);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_first_seen_copy_wins() {
        let mut set = ResultSet::new();
        set.merge(&page(1, &[("a", "first")]));
        let outcome = set.merge(&page(2, &[("a", "second"), ("c", "2")]));

        assert_eq!(outcome.merged_count(), 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(set.records()[0].payload["tag"], "first");
        assert_eq!(set.records().iter().filter(|r| r.id == "a").count(), 1);
    }

    #[test]
    fn test_duplicates_within_one_page() {
        let mut set = ResultSet::new();
        let outcome = set.merge(&page(1, &[("a", "x"), ("a", "y")]));
        assert_eq!(outcome.merged_count(), 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(set.records()[0].payload["tag"], "x");
    }

    #[test]
    fn test_insertion_order_not_sorted() {
        let mut set = ResultSet::new();
        set.merge(&page(1, &[("z", "1"), ("m", "1")]));
        set.merge(&page(2, &[("a", "2")]));
        let ids: Vec<&str> = set.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_stalled_page() {
        let mut set = ResultSet::new();
        set.merge(&page(1, &[("a", "1")]));
        assert!(set.merge(&page(2, &[("a", "1")])).is_stalled());
        assert!(!set.merge(&page(3, &[])).is_stalled());
    }

    #[test]
    fn test_from_records_rebuilds_index() {
        let mut set = ResultSet::from_records(vec![
            Record::with_id("a", json!(1)),
            Record::with_id("b", json!(2)),
        ]);
        assert!(set.contains("a"));
        assert_eq!(set.merge(&page(3, &[("b", "x"), ("c", "y")])).merged_count(), 1);
    }
}
