//! Session handler used by the gateway: keeps the most recent payloads of
//! every live session so they can be inspected over the API.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use ar_domain::{SessionAddress, SessionKey};
use ar_sessions::SessionHandler;

/// Payloads kept per session.
pub const INBOX_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct InboxMessage {
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxSnapshot {
    pub session_key: SessionKey,
    pub owner: SessionAddress,
    /// Total payloads handled by this owner, including evicted ones.
    pub received: u64,
    pub messages: Vec<InboxMessage>,
}

struct Inbox {
    owner: SessionAddress,
    received: u64,
    messages: VecDeque<InboxMessage>,
}

pub struct InboxHandler {
    capacity: usize,
    inboxes: RwLock<HashMap<SessionKey, Inbox>>,
}

impl Default for InboxHandler {
    fn default() -> Self {
        Self::new(INBOX_CAPACITY)
    }
}

impl InboxHandler {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inboxes: RwLock::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self, key: &SessionKey) -> Option<InboxSnapshot> {
        self.inboxes.read().get(key).map(|inbox| InboxSnapshot {
            session_key: key.clone(),
            owner: inbox.owner.clone(),
            received: inbox.received,
            messages: inbox.messages.iter().cloned().collect(),
        })
    }
}

#[async_trait]
impl SessionHandler for InboxHandler {
    async fn on_message(&self, key: &SessionKey, address: &SessionAddress, payload: Value) {
        let mut inboxes = self.inboxes.write();
        let inbox = inboxes.entry(key.clone()).or_insert_with(|| Inbox {
            owner: address.clone(),
            received: 0,
            messages: VecDeque::new(),
        });
        // A new owner starts a new conversation.
        if inbox.owner != *address {
            inbox.owner = address.clone();
            inbox.received = 0;
            inbox.messages.clear();
        }
        inbox.received += 1;
        if inbox.messages.len() == self.capacity {
            inbox.messages.pop_front();
        }
        inbox.messages.push_back(InboxMessage {
            received_at: Utc::now(),
            payload,
        });
    }

    async fn on_stop(&self, key: &SessionKey, address: &SessionAddress) {
        let mut inboxes = self.inboxes.write();
        if inboxes.get(key).is_some_and(|i| i.owner == *address) {
            inboxes.remove(key);
        }
    }
}
