//! The session directory actor.
//!
//! Single writer of the session map.  Every mutation of a key's record is
//! issued from [`SessionDirectoryActor::run`] while it processes its own
//! mailbox, one command at a time; N simultaneous first-time routes for
//! the same key therefore produce exactly one owner.
//!
//! Store failures fail closed: a route that cannot read or write the
//! store returns [`Error::StoreUnavailable`] and no actor is created.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ar_domain::config::DirectoryConfig;
use ar_domain::error::{Error, Result};
use ar_domain::trace::TraceEvent;
use ar_domain::{SessionAddress, SessionKey};

use crate::address_book::SessionAddressBook;
use crate::session_actor::{
    DirectoryAck, SessionActor, SessionCommand, SessionHandler, SessionMailbox, SessionSpawn,
};
use crate::session_key::{storage_key, validate_session_key};
use crate::ttl_store::TtlStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records and messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Value stored under a session's storage key.  Expiry is the store's TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub owner: SessionAddress,
    pub registered_at: DateTime<Utc>,
}

/// Where a routed payload went.
#[derive(Debug, Clone, Serialize)]
pub struct RouteReceipt {
    pub session_key: SessionKey,
    pub owner: SessionAddress,
    /// A new session actor was created for this request.
    pub spawned: bool,
}

/// Read-only view of a directory entry.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub session_key: SessionKey,
    pub owner: SessionAddress,
    pub registered_at: DateTime<Utc>,
    /// The owner's mailbox is open in this process.
    pub live: bool,
}

#[derive(Debug)]
pub enum DirectoryCommand {
    Route {
        key: SessionKey,
        payload: Value,
        reply: oneshot::Sender<Result<RouteReceipt>>,
    },
    Register {
        key: SessionKey,
        owner: SessionAddress,
    },
    RefreshTtl {
        key: SessionKey,
        owner: SessionAddress,
    },
    Lookup {
        key: SessionKey,
        reply: oneshot::Sender<Result<Option<SessionEntry>>>,
    },
    Evict {
        key: SessionKey,
        reply: oneshot::Sender<Result<bool>>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cloneable client of the directory actor.
#[derive(Clone)]
pub struct DirectoryHandle {
    tx: mpsc::Sender<DirectoryCommand>,
}

impl DirectoryHandle {
    async fn send(&self, cmd: DirectoryCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| Error::Mailbox("session directory".into()))
    }

    async fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> DirectoryCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await
            .map_err(|_| Error::Mailbox("session directory dropped the request".into()))?
    }

    /// Deliver `payload` to the owner of `key`, creating one if absent.
    pub async fn route(&self, key: SessionKey, payload: Value) -> Result<RouteReceipt> {
        validate_session_key(&key)?;
        self.ask(|reply| DirectoryCommand::Route { key, payload, reply })
            .await
    }

    pub async fn lookup(&self, key: SessionKey) -> Result<Option<SessionEntry>> {
        self.ask(|reply| DirectoryCommand::Lookup { key, reply }).await
    }

    /// Remove `key`'s record and stop its owner.  `false` if there was none.
    pub async fn evict(&self, key: SessionKey) -> Result<bool> {
        self.ask(|reply| DirectoryCommand::Evict { key, reply }).await
    }

    /// Fire-and-forget; the ack arrives in `owner`'s mailbox.
    pub async fn register(&self, key: SessionKey, owner: SessionAddress) -> Result<()> {
        self.send(DirectoryCommand::Register { key, owner }).await
    }

    /// Fire-and-forget; the ack arrives in `owner`'s mailbox.
    pub async fn refresh_ttl(&self, key: SessionKey, owner: SessionAddress) -> Result<()> {
        self.send(DirectoryCommand::RefreshTtl { key, owner }).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionDirectoryActor {
    inbox: mpsc::Receiver<DirectoryCommand>,
    myself: DirectoryHandle,
    store: Arc<dyn TtlStore>,
    address_book: Arc<SessionAddressBook>,
    handler: Arc<dyn SessionHandler>,
    ttl: Duration,
    heartbeat: Duration,
    key_prefix: String,
    session_mailbox_capacity: usize,
    shutdown: CancellationToken,
}

/// Start the directory.  Session actors it spawns stop with `shutdown`.
pub fn spawn_directory(
    config: &DirectoryConfig,
    store: Arc<dyn TtlStore>,
    address_book: Arc<SessionAddressBook>,
    handler: Arc<dyn SessionHandler>,
    shutdown: CancellationToken,
) -> Result<(DirectoryHandle, JoinHandle<()>)> {
    if config.heartbeat_secs == 0 || config.heartbeat_secs >= config.ttl_secs {
        return Err(Error::Config(format!(
            "directory.heartbeat_secs ({}) must be non-zero and below directory.ttl_secs ({})",
            config.heartbeat_secs, config.ttl_secs
        )));
    }

    let (tx, inbox) = mpsc::channel(config.mailbox_capacity.max(1));
    let handle = DirectoryHandle { tx };
    let actor = SessionDirectoryActor {
        inbox,
        myself: handle.clone(),
        store,
        address_book,
        handler,
        ttl: config.ttl(),
        heartbeat: config.heartbeat(),
        key_prefix: config.key_prefix.clone(),
        session_mailbox_capacity: config.session_mailbox_capacity,
        shutdown,
    };
    Ok((handle, tokio::spawn(actor.run())))
}

impl SessionDirectoryActor {
    async fn run(mut self) {
        tracing::info!(
            ttl_secs = self.ttl.as_secs(),
            heartbeat_secs = self.heartbeat.as_secs(),
            "session directory started"
        );
        loop {
            let cmd = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                cmd = self.inbox.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            self.handle(cmd).await;
        }
        tracing::info!("session directory stopped");
    }

    async fn handle(&mut self, cmd: DirectoryCommand) {
        match cmd {
            DirectoryCommand::Route { key, payload, reply } => {
                let result = self.route(&key, payload).await;
                if let Err(e) = &result {
                    tracing::warn!(session_key = %key, error = %e, "route failed");
                }
                let _ = reply.send(result);
            }
            DirectoryCommand::Register { key, owner } => {
                // Evicted or foreign owners must not resurrect a record.
                if !self.address_book.is_live(&owner) {
                    tracing::debug!(session_key = %key, owner = %owner, "register from unknown owner ignored");
                    return;
                }
                let ack = self.register(&key, &owner).await;
                self.ack(&key, &owner, ack);
            }
            DirectoryCommand::RefreshTtl { key, owner } => {
                let ack = self.refresh(&key, &owner).await;
                self.ack(&key, &owner, ack);
            }
            DirectoryCommand::Lookup { key, reply } => {
                let _ = reply.send(self.lookup(&key).await);
            }
            DirectoryCommand::Evict { key, reply } => {
                let _ = reply.send(self.evict(&key, "explicit").await);
            }
        }
    }

    // ── Route ───────────────────────────────────────────────────────

    async fn route(&mut self, key: &SessionKey, payload: Value) -> Result<RouteReceipt> {
        if let Some(record) = self.read(key).await? {
            match self.address_book.live(&record.owner) {
                Some(mailbox) => match mailbox.try_send(SessionCommand::Deliver(payload)) {
                    Ok(()) => {
                        return Ok(RouteReceipt {
                            session_key: key.clone(),
                            owner: record.owner,
                            spawned: false,
                        })
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        return Err(Error::Mailbox(format!(
                            "session {} mailbox is full",
                            record.owner
                        )))
                    }
                    Err(mpsc::error::TrySendError::Closed(SessionCommand::Deliver(p))) => {
                        self.evict(key, "stale_owner").await?;
                        return self.spawn_owner(key, p).await;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        return Err(Error::Other("unexpected command returned".into()))
                    }
                },
                None => {
                    self.evict(key, "stale_owner").await?;
                }
            }
        }
        self.spawn_owner(key, payload).await
    }

    /// Miss path: record first, then actor, then payload.
    async fn spawn_owner(&mut self, key: &SessionKey, payload: Value) -> Result<RouteReceipt> {
        let owner = SessionAddress::mint();
        self.write(key, &owner).await?;

        let spawned = SessionActor::spawn(SessionSpawn {
            key: key.clone(),
            address: owner.clone(),
            directory: self.myself.clone(),
            handler: self.handler.clone(),
            address_book: self.address_book.clone(),
            heartbeat: self.heartbeat,
            ttl: self.ttl,
            mailbox_capacity: self.session_mailbox_capacity,
            shutdown: self.shutdown.child_token(),
        });
        let mailbox: SessionMailbox = match spawned {
            Ok((mailbox, _)) => mailbox,
            Err(e) => {
                self.delete(key).await?;
                return Err(e);
            }
        };

        TraceEvent::SessionSpawned {
            session_key: key.to_string(),
            owner: owner.to_string(),
        }
        .emit();

        mailbox
            .try_send(SessionCommand::Deliver(payload))
            .map_err(|e| Error::Mailbox(format!("session {owner}: {e}")))?;

        Ok(RouteReceipt {
            session_key: key.clone(),
            owner,
            spawned: true,
        })
    }

    // ── Register / refresh ──────────────────────────────────────────

    async fn register(&mut self, key: &SessionKey, owner: &SessionAddress) -> DirectoryAck {
        match self.read(key).await {
            Err(e) => DirectoryAck::Failed(e.to_string()),
            Ok(Some(record))
                if record.owner != *owner && self.address_book.is_live(&record.owner) =>
            {
                TraceEvent::SessionSuperseded {
                    session_key: key.to_string(),
                    stale_owner: owner.to_string(),
                    current_owner: record.owner.to_string(),
                }
                .emit();
                DirectoryAck::Superseded {
                    current: record.owner,
                }
            }
            Ok(_) => match self.write(key, owner).await {
                Ok(()) => {
                    TraceEvent::SessionRegistered {
                        session_key: key.to_string(),
                        owner: owner.to_string(),
                    }
                    .emit();
                    DirectoryAck::Registered
                }
                Err(e) => DirectoryAck::Failed(e.to_string()),
            },
        }
    }

    async fn refresh(&mut self, key: &SessionKey, owner: &SessionAddress) -> DirectoryAck {
        let record = match self.read(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return DirectoryAck::Missing,
            Err(e) => return DirectoryAck::Failed(e.to_string()),
        };
        if record.owner != *owner {
            return DirectoryAck::Superseded {
                current: record.owner,
            };
        }
        let skey = storage_key(&self.key_prefix, key);
        match self.store.expire(&skey, self.ttl).await {
            Ok(true) => DirectoryAck::Refreshed,
            Ok(false) => DirectoryAck::Missing,
            Err(e) => {
                self.store_failure("expire", &skey, &e);
                DirectoryAck::Failed(e.to_string())
            }
        }
    }

    /// Post `ack` into `owner`'s mailbox.  Never waits: a full mailbox
    /// drops the ack and the next heartbeat asks again.
    fn ack(&self, key: &SessionKey, owner: &SessionAddress, ack: DirectoryAck) {
        let Some(mailbox) = self.address_book.live(owner) else {
            tracing::debug!(session_key = %key, owner = %owner, ?ack, "ack for stopped owner dropped");
            return;
        };
        if let Err(e) = mailbox.try_send(SessionCommand::DirectoryAck(ack)) {
            tracing::warn!(session_key = %key, owner = %owner, error = %e, "ack not delivered");
        }
    }

    // ── Lookup / evict ──────────────────────────────────────────────

    async fn lookup(&mut self, key: &SessionKey) -> Result<Option<SessionEntry>> {
        Ok(self.read(key).await?.map(|record| SessionEntry {
            session_key: key.clone(),
            live: self.address_book.is_live(&record.owner),
            owner: record.owner,
            registered_at: record.registered_at,
        }))
    }

    async fn evict(&mut self, key: &SessionKey, reason: &str) -> Result<bool> {
        let Some(record) = self.read(key).await? else {
            return Ok(false);
        };
        self.delete(key).await?;
        if let Some(mailbox) = self.address_book.remove(&record.owner) {
            let _ = mailbox.try_send(SessionCommand::Stop);
        }
        TraceEvent::SessionEvicted {
            session_key: key.to_string(),
            owner: record.owner.to_string(),
            reason: reason.to_string(),
        }
        .emit();
        Ok(true)
    }

    // ── Store access ────────────────────────────────────────────────

    /// Current record for `key`.  An undecodable record is deleted and
    /// reported as absent.
    async fn read(&self, key: &SessionKey) -> Result<Option<SessionRecord>> {
        let skey = storage_key(&self.key_prefix, key);
        let raw = self.store.get(&skey).await.map_err(|e| {
            self.store_failure("get", &skey, &e);
            e
        })?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(session_key = %key, error = %e, "corrupt session record discarded");
                self.delete(key).await?;
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &SessionKey, owner: &SessionAddress) -> Result<()> {
        let skey = storage_key(&self.key_prefix, key);
        let record = SessionRecord {
            owner: owner.clone(),
            registered_at: Utc::now(),
        };
        let value = serde_json::to_string(&record)?;
        match self.store.set_with_ttl(&skey, &value, self.ttl).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::StoreUnavailable(format!("store refused write of {skey}"))),
            Err(e) => {
                self.store_failure("set_with_ttl", &skey, &e);
                Err(e)
            }
        }
    }

    async fn delete(&self, key: &SessionKey) -> Result<()> {
        let skey = storage_key(&self.key_prefix, key);
        self.store.delete(&skey).await.map(|_| ()).map_err(|e| {
            self.store_failure("delete", &skey, &e);
            e
        })
    }

    fn store_failure(&self, operation: &str, key: &str, error: &Error) {
        TraceEvent::StoreFailure {
            operation: operation.to_string(),
            key: key.to_string(),
            error: error.to_string(),
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_json() {
        let record = SessionRecord {
            owner: SessionAddress::from("session://abc"),
            registered_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"owner\":\"session://abc\""));
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
