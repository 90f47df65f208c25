//! Rate controller configuration.

use std::time::Duration;

use crate::config::EngineConfig;

/// Tuning for the adaptive request pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Delay floor.
    pub min_delay: Duration,
    /// Starting delay, and the base for failure growth and retry backoff.
    pub base_delay: Duration,
    /// Delay ceiling.
    pub max_delay: Duration,
    /// Jitter multiplier bounds applied to each returned delay.
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Consecutive successes required before the delay starts to decay.
    pub decay_after_successes: u32,
    /// Multiplier applied per decision once the decay threshold is passed.
    pub decay_factor: f64,
    /// Growth base for `base_delay * growth^failure_streak`.
    pub failure_growth: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RateLimitConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(config.min_delay_ms),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_min: config.jitter_min,
            jitter_max: config.jitter_max,
            decay_after_successes: config.decay_after_successes,
            decay_factor: config.decay_factor,
            failure_growth: config.failure_growth,
        }
    }
}

impl RateLimitConfig {
    pub fn min_ms(&self) -> u64 {
        duration_ms(self.min_delay)
    }

    pub fn base_ms(&self) -> u64 {
        duration_ms(self.base_delay)
    }

    /// Never below the floor, so clamping is always well-defined.
    pub fn max_ms(&self) -> u64 {
        duration_ms(self.max_delay).max(self.min_ms())
    }

    /// Jitter bounds in ascending order.
    pub fn jitter_bounds(&self) -> (f64, f64) {
        if self.jitter_min <= self.jitter_max {
            (self.jitter_min, self.jitter_max)
        } else {
            (self.jitter_max, self.jitter_min)
        }
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
