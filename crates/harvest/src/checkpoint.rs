//! Checkpoint persistence.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::models::{Checkpoint, JobKey, JobState, CHECKPOINT_VERSION};
use crate::storage::{checkpoint_key, Storage, StorageError};

/// Reads and writes job checkpoints through a [`Storage`] backend.
///
/// The pagination manager is the only writer for a given job.
#[derive(Clone)]
pub struct CheckpointStore {
    storage: Arc<dyn Storage>,
}

impl CheckpointStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn key_for(job: &JobKey) -> String {
        checkpoint_key(job)
    }

    /// Persist a snapshot of `state`, returning the key it was written to.
    pub async fn save(&self, state: &JobState) -> Result<String> {
        let key = Self::key_for(&state.key);
        let checkpoint = Checkpoint::from(state);
        let value =
            serde_json::to_value(&checkpoint).map_err(|e| StorageError::serialization(&key, e))?;
        self.storage.write_json(&key, &value).await?;
        debug!(
            "[{}] Checkpoint saved at page {} ({} completed, {} failed)",
            state.key,
            state.current_page,
            state.completed_pages.len(),
            state.failed_pages.len()
        );
        Ok(key)
    }

    /// Load the raw checkpoint for a job, if one exists.
    pub async fn load_checkpoint(&self, job: &JobKey) -> Result<Option<Checkpoint>> {
        let key = Self::key_for(job);
        let Some(value) = self.storage.read_json(&key).await? else {
            return Ok(None);
        };

        let checkpoint: Checkpoint =
            serde_json::from_value(value).map_err(|e| StorageError::serialization(&key, e))?;

        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(HarvestError::Unrecoverable(format!(
                "checkpoint {} has version {}, newest supported is {}",
                key, checkpoint.version, CHECKPOINT_VERSION
            )));
        }
        if checkpoint.category != job.category || checkpoint.query != job.query {
            warn!(
                "[{}] Checkpoint {} belongs to {}/{}, ignoring",
                job, key, checkpoint.category, checkpoint.query
            );
            return Ok(None);
        }

        Ok(Some(checkpoint))
    }

    /// Restore the job state for `(category, query)`.
    pub async fn load(&self, category: &str, query: &str) -> Result<Option<JobState>> {
        let job = JobKey::new(category, query);
        Ok(self.load_checkpoint(&job).await?.map(Checkpoint::into_state))
    }

    pub async fn exists(&self, job: &JobKey) -> Result<bool> {
        Ok(self.storage.exists(&Self::key_for(job)).await?)
    }
}
