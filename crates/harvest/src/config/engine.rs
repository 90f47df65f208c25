//! Pagination engine tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Engine configuration (`[engine]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay floor between requests.
    pub min_delay_ms: u64,
    /// Starting delay, and the base for failure growth and retry backoff.
    pub base_delay_ms: u64,
    /// Delay ceiling.
    pub max_delay_ms: u64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Consecutive successes before the delay starts to decay.
    pub decay_after_successes: u32,
    pub decay_factor: f64,
    pub failure_growth: f64,
    /// Retries per page after the first attempt.
    pub max_retries: u32,
    /// Pages per flushed batch.
    pub batch_size: usize,
    /// Page attempts between checkpoints.
    pub checkpoint_interval: u32,
    /// Cap on the number of pages harvested per job.
    pub max_pages: u32,
    /// Cooldown after consecutive failed pages.
    pub block_cooldown_ms: u64,
    /// Consecutive failed pages that count as a probable block.
    pub consecutive_failures_for_cooldown: u32,
    /// Upper bound on a single fetch.
    pub fetch_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter_min: 0.85,
            jitter_max: 1.15,
            decay_after_successes: 5,
            decay_factor: 0.9,
            failure_growth: 1.5,
            max_retries: 2,
            batch_size: 10,
            checkpoint_interval: 5,
            max_pages: 100,
            block_cooldown_ms: 90_000,
            consecutive_failures_for_cooldown: 2,
            fetch_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn block_cooldown(&self) -> Duration {
        Duration::from_millis(self.block_cooldown_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(HarvestError::Config(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.batch_size == 0 {
            return Err(HarvestError::Config("batch_size must be at least 1".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(HarvestError::Config(
                "checkpoint_interval must be at least 1".into(),
            ));
        }
        if self.max_pages == 0 {
            return Err(HarvestError::Config("max_pages must be at least 1".into()));
        }
        if !(self.jitter_min > 0.0 && self.jitter_min <= self.jitter_max) {
            return Err(HarvestError::Config(format!(
                "jitter bounds out of order: [{}, {}]",
                self.jitter_min, self.jitter_max
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(HarvestError::Config(
                "fetch_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = EngineConfig {
            min_delay_ms: 5_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        for config in [
            EngineConfig {
                batch_size: 0,
                ..Default::default()
            },
            EngineConfig {
                checkpoint_interval: 0,
                ..Default::default()
            },
            EngineConfig {
                jitter_min: 1.2,
                jitter_max: 0.8,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str("batch_size = 25\nmax_pages = 12").unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_pages, 12);
        assert_eq!(config.base_delay_ms, 2_000);
    }
}
