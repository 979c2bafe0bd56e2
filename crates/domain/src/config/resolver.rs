use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Distributed resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tuning for the distributed resolution actor.
///
/// Every registry round trip is bounded by `query_timeout_ms`; a query that
/// times out or faults is retried at most `max_retries` times before the
/// request fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Per-query deadline, in milliseconds.
    #[serde(default = "d_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Retries per query after the first attempt.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Base delay before retrying a faulted query (doubles per attempt).
    #[serde(default = "d_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Upper bound on state transitions for a single request.
    #[serde(default = "d_max_hops")]
    pub max_hops: u32,
    #[serde(default = "d_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: d_query_timeout_ms(),
            max_retries: d_max_retries(),
            retry_backoff_ms: d_retry_backoff_ms(),
            max_hops: d_max_hops(),
            mailbox_capacity: d_mailbox_capacity(),
        }
    }
}

impl ResolverConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_query_timeout_ms() -> u64 {
    2_000
}
fn d_max_retries() -> u32 {
    3
}
fn d_retry_backoff_ms() -> u64 {
    100
}
fn d_max_hops() -> u32 {
    256
}
pub(super) fn d_mailbox_capacity() -> usize {
    1_024
}
