//! External TTL key-value store.
//!
//! Durability of the session map is delegated to this store.  Only the
//! directory actor writes to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use ar_domain::error::{Error, Result};

/// Operations the directory needs from the store.  Every call may fail
/// with [`Error::StoreUnavailable`].
#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write `value` under `key`, replacing any previous value and TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    /// Reset the TTL of an existing key.  `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
    /// `false` if the key was absent.
    async fn delete(&self, key: &str) -> Result<bool>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store.  Expiry follows the tokio clock, so paused-time tests
/// can advance past a TTL deterministically.
pub struct InMemoryTtlStore {
    entries: Mutex<HashMap<String, Entry>>,
    reachable: AtomicBool,
}

impl Default for InMemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTtlStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unreachable every call fails.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("in-memory store marked unreachable".into()))
        }
    }
}

/// Drop `key` if its TTL has lapsed; returns the live entry, if any.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let expired = entries
        .get(key)
        .is_some_and(|e| e.expires_at <= Instant::now());
    if expired {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl TtlStore for InMemoryTtlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let mut entries = self.entries.lock();
        Ok(live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check()?;
        self.entries.lock().insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check()?;
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        let mut entries = self.entries.lock();
        let existed = live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }
}
