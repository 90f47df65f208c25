//! Serialized job snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Batch, BatchHandle, JobKey, JobState, JobStats, JobStatus, NavigationState};
use crate::rate_limit::RateState;

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Durable snapshot of a [`JobState`].
///
/// Page sets are stored as sorted lists so checkpoint files are diffable and
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub category: String,
    pub query: String,
    pub status: JobStatus,
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub reported_pages: Option<u32>,
    pub completed_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
    #[serde(default)]
    pub navigation: NavigationState,
    #[serde(default)]
    pub rate: RateState,
    #[serde(default)]
    pub stats: JobStats,
    #[serde(default)]
    pub batches: Vec<BatchHandle>,
    #[serde(default)]
    pub open_batch: Batch,
    #[serde(default)]
    pub last_error: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.category.clone(), self.query.clone())
    }

    /// Rehydrate the in-memory job state.
    pub fn into_state(self) -> JobState {
        let key = self.key();
        JobState {
            key,
            status: self.status,
            current_page: self.current_page.max(1),
            completed_pages: self.completed_pages.into_iter().collect(),
            failed_pages: self.failed_pages.into_iter().collect(),
            total_pages: self.total_pages,
            reported_pages: self.reported_pages,
            navigation: self.navigation,
            rate: self.rate,
            stats: self.stats,
            batches: self.batches,
            open_batch: self.open_batch,
            last_error: self.last_error,
        }
    }
}

impl From<&JobState> for Checkpoint {
    fn from(state: &JobState) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            category: state.key.category.clone(),
            query: state.key.query.clone(),
            status: state.status,
            current_page: state.current_page,
            total_pages: state.total_pages,
            reported_pages: state.reported_pages,
            // BTreeSet iterates in ascending order
            completed_pages: state.completed_pages.iter().copied().collect(),
            failed_pages: state.failed_pages.iter().copied().collect(),
            navigation: state.navigation.clone(),
            rate: state.rate.clone(),
            stats: state.stats.clone(),
            batches: state.batches.clone(),
            open_batch: state.open_batch.clone(),
            last_error: state.last_error.clone(),
            saved_at: Utc::now(),
        }
    }
}
