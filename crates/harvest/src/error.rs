//! Error taxonomy for harvesting jobs.

use thiserror::Error;

use crate::fetcher::FetchError;
use crate::storage::StorageError;

/// Result type for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Errors surfaced by the engine and its adapters.
///
/// Per-page fetch failures are retried and recorded on the job; they only
/// show up here when the first page cannot be loaded at all. Running out of
/// time budget is a pause, not an error, and has no variant.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("No navigation state could be obtained: {0}")]
    NavigationLost(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Unrecoverable(String),
}

impl HarvestError {
    /// Whether this error should mark the job as `failed`.
    ///
    /// Navigation loss is a degraded-but-continuable condition.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HarvestError::NavigationLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_lost_is_not_fatal() {
        assert!(!HarvestError::NavigationLost("no refId".into()).is_fatal());
        assert!(HarvestError::Unrecoverable("disk full".into()).is_fatal());
        assert!(HarvestError::Storage(StorageError::Backend("down".into())).is_fatal());
    }
}
