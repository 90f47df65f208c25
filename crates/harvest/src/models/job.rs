//! Job identity, resumable job state, and job results.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Batch, BatchHandle, NavigationState, Record};
use crate::rate_limit::RateState;

/// Maximum slug length before the hash suffix.
const MAX_SLUG_LEN: usize = 48;

/// Identifies a harvesting job: one query within one category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub category: String,
    pub query: String,
}

impl JobKey {
    pub fn new(category: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            query: query.into(),
        }
    }

    /// Storage-safe form of the category.
    pub fn category_slug(&self) -> String {
        let slug = slugify(&self.category);
        if slug.is_empty() {
            "uncategorized".to_string()
        } else {
            slug
        }
    }

    /// Storage-safe form of the query.
    ///
    /// A hash suffix keeps queries that slugify identically apart.
    pub fn query_slug(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.query.as_bytes());
        let digest = hex::encode(hasher.finalize());

        let slug = slugify(&self.query);
        let slug = if slug.is_empty() { "all".to_string() } else { slug };
        format!("{}-{}", slug, &digest[..8])
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.query)
    }
}

fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// A job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub key: JobKey,
    /// Overrides the configured page cap.
    pub max_pages: Option<u32>,
    /// First page to harvest after the seed page (fresh jobs only).
    pub start_page: Option<u32>,
    /// Also retry pages that failed on an earlier run.
    pub retry_failed: bool,
}

impl JobSpec {
    pub fn new(category: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            key: JobKey::new(category, query),
            max_pages: None,
            start_page: None,
            retry_failed: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_start_page(mut self, start_page: u32) -> Self {
        self.start_page = Some(start_page);
        self
    }

    pub fn with_retry_failed(mut self) -> Self {
        self.retry_failed = true;
        self
    }
}

/// Status of a job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Running,
    Completed,
    /// Stopped by the time budget; valid for resume.
    Paused,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative job statistics, carried across resumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStats {
    /// Effective page count (after the cap).
    pub total_pages: u32,
    pub pages_completed: u32,
    pub pages_failed: u32,
    /// Network round-trips attempted, including retries.
    pub requests: u64,
    pub retries: u64,
    pub rate_limited: u64,
    pub empty_responses: u64,
    pub transport_errors: u64,
    pub invalid_responses: u64,
    /// Unique records harvested.
    pub records: u64,
    pub duplicates: u64,
    /// Non-empty pages that yielded no new records.
    pub stalled_pages: u64,
    pub cooldowns: u64,
    pub batches_flushed: u64,
    pub checkpoints_saved: u64,
    pub waited_ms: u64,
    pub elapsed_ms: u64,
    pub runs: u32,
    pub navigation_degraded: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The resumable unit of work, owned by the pagination manager.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub key: JobKey,
    pub status: JobStatus,
    /// Next page to attempt.
    pub current_page: u32,
    pub completed_pages: BTreeSet<u32>,
    pub failed_pages: BTreeSet<u32>,
    /// Effective page count: `min(reported, max_pages)`.
    pub total_pages: u32,
    /// Page count implied by the first page, before the cap.
    pub reported_pages: Option<u32>,
    pub navigation: NavigationState,
    pub rate: RateState,
    pub stats: JobStats,
    /// Batches already flushed to storage, in order.
    pub batches: Vec<BatchHandle>,
    /// Batch being filled.
    pub open_batch: Batch,
    pub last_error: Option<String>,
}

impl JobState {
    pub fn new(key: JobKey, rate: RateState) -> Self {
        Self {
            key,
            status: JobStatus::Running,
            current_page: 1,
            completed_pages: BTreeSet::new(),
            failed_pages: BTreeSet::new(),
            total_pages: 0,
            reported_pages: None,
            navigation: NavigationState::default(),
            rate,
            stats: JobStats::default(),
            batches: Vec::new(),
            open_batch: Batch::default(),
            last_error: None,
        }
    }

    /// Whether the seed page has been loaded, i.e. the page count is known.
    pub fn is_seeded(&self) -> bool {
        self.completed_pages.contains(&1) && self.total_pages > 0
    }

    /// Pages still to attempt, in increasing order.
    ///
    /// Everything from `current_page` on that is not completed. With
    /// `retry_failed`, earlier pages that failed on a previous run come first.
    pub fn pending_pages(&self, retry_failed: bool) -> Vec<u32> {
        let from = self.current_page.max(2);
        (2..=self.total_pages)
            .filter(|page| !self.completed_pages.contains(page))
            .filter(|page| *page >= from || (retry_failed && self.failed_pages.contains(page)))
            .collect()
    }

    pub fn mark_completed(&mut self, page: u32) {
        self.failed_pages.remove(&page);
        self.completed_pages.insert(page);
        self.sync_page_counts();
    }

    pub fn mark_failed(&mut self, page: u32) {
        if !self.completed_pages.contains(&page) {
            self.failed_pages.insert(page);
        }
        self.sync_page_counts();
    }

    fn sync_page_counts(&mut self) {
        self.stats.pages_completed = u32::try_from(self.completed_pages.len()).unwrap_or(u32::MAX);
        self.stats.pages_failed = u32::try_from(self.failed_pages.len()).unwrap_or(u32::MAX);
    }
}

/// Outcome of a job run.
///
/// Always carries enough to resume: page sets, stats, and the location of
/// the last checkpoint that was written successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub key: JobKey,
    pub status: JobStatus,
    pub total_pages: u32,
    pub current_page: u32,
    pub completed_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
    pub stats: JobStats,
    pub checkpoint_key: Option<String>,
    /// Deduplicated records in arrival order.
    pub records: Vec<Record>,
    pub error: Option<String>,
}
