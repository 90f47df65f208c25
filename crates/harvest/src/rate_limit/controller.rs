//! Adaptive delay state machine.
//!
//! Pure state transitions with no I/O: the caller owns the [`RateState`] and
//! threads it through [`RateController::next_delay`] and
//! [`RateController::record_outcome`].

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::RateLimitConfig;
use super::backoff_delay;
use crate::fetcher::FetchErrorKind;

/// Persistent pacing state for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateState {
    /// Unjittered delay, always within `[min_delay, max_delay]`.
    pub current_delay_ms: u64,
    pub success_streak: u32,
    pub failure_streak: u32,
    /// Set by a throttling signal, consumed by the next delay decision.
    pub rate_limited: bool,
}

impl RateState {
    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.current_delay_ms)
    }
}

/// Classified result of one page attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Non-empty record list returned.
    Success,
    /// Parseable but no records: a failure, but not throttling.
    Invalid,
    /// Explicit throttle signal.
    RateLimited,
    /// Timeout or connection failure.
    Transport,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl From<FetchErrorKind> for Outcome {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::Transport => Outcome::Transport,
            FetchErrorKind::RateLimited => Outcome::RateLimited,
            FetchErrorKind::InvalidResponse => Outcome::Invalid,
        }
    }
}

/// Computes request delays from recent outcomes.
#[derive(Debug, Clone, Default)]
pub struct RateController {
    config: RateLimitConfig,
}

impl RateController {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// State for a fresh job: base delay, no streaks.
    pub fn initial_state(&self) -> RateState {
        RateState {
            current_delay_ms: self.clamp(self.config.base_ms()),
            ..Default::default()
        }
    }

    /// Decide the next delay.
    ///
    /// Returns the jittered delay to wait and the new state, which stores the
    /// unjittered value. `jitter` is clamped to the configured bounds.
    pub fn next_delay(&self, state: &RateState, jitter: f64) -> (Duration, RateState) {
        let mut next = state.clone();
        let current = self.clamp(state.current_delay_ms);

        let delay_ms = if state.rate_limited {
            next.rate_limited = false;
            current.saturating_mul(2)
        } else if state.failure_streak > 0 {
            let grown = self.config.base_ms() as f64
                * self.config.failure_growth.powi(state.failure_streak.min(64) as i32);
            to_ms(grown)
        } else if state.success_streak > self.config.decay_after_successes {
            to_ms(current as f64 * self.config.decay_factor)
        } else {
            current
        };

        next.current_delay_ms = self.clamp(delay_ms);

        let (lo, hi) = self.config.jitter_bounds();
        let jitter = jitter.clamp(lo, hi);
        let jittered = Duration::from_millis(to_ms(next.current_delay_ms as f64 * jitter));
        (jittered, next)
    }

    /// [`Self::next_delay`] with jitter drawn from the thread RNG.
    pub fn next_delay_random(&self, state: &RateState) -> (Duration, RateState) {
        let jitter = self.sample_jitter(&mut rand::rng());
        self.next_delay(state, jitter)
    }

    /// Delay before retry `attempt` (1-based) of the same page.
    ///
    /// The larger of exponential backoff from the base delay and the
    /// controller's own decision for the current failure streak.
    pub fn retry_delay(&self, attempt: u32, state: &RateState) -> (Duration, RateState) {
        let backoff = backoff_delay(attempt, self.config.base_delay, self.config.max_delay);
        let (paced, next) = self.next_delay_random(state);
        (backoff.max(paced), next)
    }

    pub fn sample_jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let (lo, hi) = self.config.jitter_bounds();
        if lo >= hi {
            return lo;
        }
        rng.random_range(lo..=hi)
    }

    /// Fold an outcome into the streaks.
    pub fn record_outcome(&self, state: &RateState, outcome: Outcome) -> RateState {
        let mut next = state.clone();
        match outcome {
            Outcome::Success => {
                next.success_streak = next.success_streak.saturating_add(1);
                next.failure_streak = 0;
            }
            Outcome::Invalid | Outcome::Transport => {
                next.success_streak = 0;
                next.failure_streak = next.failure_streak.saturating_add(1);
            }
            Outcome::RateLimited => {
                next.success_streak = 0;
                next.failure_streak = next.failure_streak.saturating_add(1);
                next.rate_limited = true;
            }
        }
        next.current_delay_ms = self.clamp(next.current_delay_ms);
        next
    }

    fn clamp(&self, delay_ms: u64) -> u64 {
        delay_ms.clamp(self.config.min_ms(), self.config.max_ms())
    }
}

fn to_ms(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u64::MAX as f64) as u64
    } else if value.is_infinite() && value > 0.0 {
        u64::MAX
    } else {
        0
    }
}
