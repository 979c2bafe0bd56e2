use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::resolver::d_mailbox_capacity;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session directory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session-affinity directory configuration.
///
/// `heartbeat_secs` must stay strictly below `ttl_secs`; otherwise a live
/// session actor can lapse out of the directory between two heartbeats and
/// be replaced while it still believes it owns the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Lifetime of a session record without a refresh.
    #[serde(default = "d_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval at which session actors refresh their record.
    #[serde(default = "d_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "d_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Mailbox size of each session actor.
    #[serde(default = "d_session_mailbox_capacity")]
    pub session_mailbox_capacity: usize,
    /// Namespace prefix for keys written to the TTL store.
    #[serde(default = "d_key_prefix")]
    pub key_prefix: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: d_ttl_secs(),
            heartbeat_secs: d_heartbeat_secs(),
            mailbox_capacity: d_mailbox_capacity(),
            session_mailbox_capacity: d_session_mailbox_capacity(),
            key_prefix: d_key_prefix(),
        }
    }
}

impl DirectoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_ttl_secs() -> u64 {
    30
}
fn d_heartbeat_secs() -> u64 {
    10
}
fn d_session_mailbox_capacity() -> usize {
    64
}
fn d_key_prefix() -> String {
    "session".into()
}
