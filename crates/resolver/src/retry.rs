//! Retry budget and back-off for registry queries.
//!
//! The back-off ceiling doubles per failed attempt up to `cap`.  The delay
//! is half the ceiling plus a share of the other half picked by the
//! query's token, so requests that fail together retry apart while one
//! request's schedule stays reproducible.

use std::time::Duration;

use ar_domain::config::ResolverConfig;
use ar_protocol::QueryToken;

/// Doublings applied before the ceiling stops growing.
const MAX_DOUBLINGS: u32 = 16;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Ceiling after the first failed attempt.
    pub base: Duration,
    /// Upper bound on any delay.
    pub cap: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            base: config.retry_backoff(),
            max_retries: config.max_retries,
            ..Default::default()
        }
    }

    /// Whether a query that has already been attempted `attempts` times
    /// may be sent again.
    pub fn may_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Largest delay after `failed_attempts` failures.
    pub fn ceiling(&self, failed_attempts: u32) -> Duration {
        let doublings = failed_attempts.saturating_sub(1).min(MAX_DOUBLINGS);
        self.base.saturating_mul(1 << doublings).min(self.cap)
    }

    /// Delay before re-sending the query that `token` identified, after
    /// `failed_attempts` failures.  Always within `[ceiling / 2, ceiling]`.
    pub fn backoff(&self, token: QueryToken, failed_attempts: u32) -> Duration {
        let half = self.ceiling(failed_attempts) / 2;
        half + half.mul_f64(token_fraction(token))
    }
}

/// Fraction in `[0, 1)` mixed from the token (splitmix64 finalizer).
fn token_fraction(token: QueryToken) -> f64 {
    let mut x = (token.correlation_id.get() << 32) ^ u64::from(token.seq);
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64
}
