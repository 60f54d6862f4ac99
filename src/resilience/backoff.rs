//! Exponential backoff with optional jitter.

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

use crate::config::{Jitter, RetryConfig};

/// Delay after failed attempt `attempt` (0-indexed): `initial_ms * 2^attempt`,
/// capped at `max_ms`, then jittered.
pub fn calculate_backoff(attempt: u32, initial_ms: u64, max_ms: u64, jitter: Jitter) -> Duration {
    let exponential_base = 2u64.saturating_pow(attempt);
    let delay_ms = initial_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jittered = match jitter {
        Jitter::None => capped_delay,
        Jitter::Full => {
            if capped_delay == 0 {
                0
            } else {
                rand::thread_rng().gen_range(0..=capped_delay)
            }
        }
        Jitter::Equal => {
            let half = capped_delay / 2;
            let spread = capped_delay - half;
            half + if spread > 0 {
                rand::thread_rng().gen_range(0..=spread)
            } else {
                0
            }
        }
    };

    Duration::from_millis(jittered)
}

/// Parse a numeric `retry-after` header (seconds) into a delay.
///
/// HTTP-date values are ignored and fall back to the computed backoff.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: u64 = value.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Delay to sleep before the attempt following `attempt`.
///
/// A server-provided `retry_after` wins over the exponential schedule, bounded
/// by `max_retry_after_ms`.
pub fn next_delay(
    attempt: u32,
    initial_ms: u64,
    config: &RetryConfig,
    retry_after: Option<Duration>,
) -> Duration {
    match retry_after {
        Some(hint) => hint.min(Duration::from_millis(config.max_retry_after_ms)),
        None => calculate_backoff(attempt, initial_ms, config.max_delay_ms, config.jitter),
    }
}
