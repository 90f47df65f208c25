//! Rate-adaptive request pacing.
//!
//! The [`RateController`] decides how long to wait before each request from
//! the job's recent outcomes. Helpers for retry backoff and `Retry-After`
//! parsing are shared with fetcher implementations.

mod config;
mod controller;

use std::time::Duration;

pub use config::RateLimitConfig;
pub use controller::{Outcome, RateController, RateState};

pub(crate) use config::duration_ms;

/// Parse a `Retry-After` header value (seconds), capped at `max`.
///
/// Returns `None` if the header is missing or not an integer.
pub fn parse_retry_after(header_value: Option<&str>, max: Duration) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(max))
}

/// Exponential backoff `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(0, base, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base, max), Duration::from_secs(16));
        assert_eq!(backoff_delay(4, base, max), max);
        assert_eq!(backoff_delay(99, base, max), max);
    }

    #[test]
    fn test_parse_retry_after() {
        let max = Duration::from_secs(30);
        assert_eq!(parse_retry_after(Some("5"), max), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some(" 120 "), max), Some(max));
        assert_eq!(parse_retry_after(Some("soon"), max), None);
        assert_eq!(parse_retry_after(None, max), None);
    }
}
