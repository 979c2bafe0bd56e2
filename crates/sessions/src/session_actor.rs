//! Per-session actor.
//!
//! Owns exactly one session key.  On start it registers with the
//! directory, then refreshes its record every heartbeat.  Directory
//! answers come back as [`DirectoryAck`] messages in its own mailbox:
//!
//! - `Missing`: the record lapsed; register again at once.
//! - `Superseded`: another owner holds the key; stop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use ar_domain::error::{Error, Result};
use ar_domain::{SessionAddress, SessionKey};

use crate::address_book::SessionAddressBook;
use crate::directory::DirectoryHandle;

pub type SessionMailbox = mpsc::Sender<SessionCommand>;

#[derive(Debug)]
pub enum SessionCommand {
    /// A routed payload.
    Deliver(Value),
    DirectoryAck(DirectoryAck),
    Stop,
}

/// Directory's answer to a register or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryAck {
    Registered,
    Refreshed,
    /// The record had already expired; nothing was refreshed.
    Missing,
    /// The key now belongs to `current`.
    Superseded { current: SessionAddress },
    /// The store could not be reached; retried on the next heartbeat.
    Failed(String),
}

/// Application logic of a session.  Called once per delivered payload, in
/// delivery order.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn on_message(&self, key: &SessionKey, address: &SessionAddress, payload: Value);

    async fn on_stop(&self, _key: &SessionKey, _address: &SessionAddress) {}
}

pub(crate) struct SessionActor {
    key: SessionKey,
    address: SessionAddress,
    inbox: mpsc::Receiver<SessionCommand>,
    directory: DirectoryHandle,
    handler: Arc<dyn SessionHandler>,
    address_book: Arc<SessionAddressBook>,
    heartbeat: Duration,
    shutdown: CancellationToken,
}

pub(crate) struct SessionSpawn {
    pub key: SessionKey,
    pub address: SessionAddress,
    pub directory: DirectoryHandle,
    pub handler: Arc<dyn SessionHandler>,
    pub address_book: Arc<SessionAddressBook>,
    pub heartbeat: Duration,
    pub ttl: Duration,
    pub mailbox_capacity: usize,
    pub shutdown: CancellationToken,
}

impl SessionActor {
    /// Start the actor and publish its mailbox in the address book.
    pub(crate) fn spawn(spawn: SessionSpawn) -> Result<(SessionMailbox, JoinHandle<()>)> {
        if spawn.heartbeat.is_zero() || spawn.heartbeat >= spawn.ttl {
            return Err(Error::Config(format!(
                "session heartbeat ({:?}) must be non-zero and below the directory ttl ({:?})",
                spawn.heartbeat, spawn.ttl
            )));
        }

        let (tx, inbox) = mpsc::channel(spawn.mailbox_capacity.max(1));
        spawn.address_book.insert(spawn.address.clone(), tx.clone());

        let actor = SessionActor {
            key: spawn.key,
            address: spawn.address,
            inbox,
            directory: spawn.directory,
            handler: spawn.handler,
            address_book: spawn.address_book,
            heartbeat: spawn.heartbeat,
            shutdown: spawn.shutdown,
        };
        Ok((tx, tokio::spawn(actor.run())))
    }

    async fn run(mut self) {
        tracing::debug!(session_key = %self.key, owner = %self.address, "session actor started");
        self.register().await;

        let mut heartbeat = tokio::time::interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = heartbeat.tick() => {
                    if let Err(e) = self
                        .directory
                        .refresh_ttl(self.key.clone(), self.address.clone())
                        .await
                    {
                        tracing::warn!(session_key = %self.key, error = %e, "heartbeat not delivered");
                        break;
                    }
                }
                cmd = self.inbox.recv() => match cmd {
                    Some(SessionCommand::Deliver(payload)) => {
                        self.handler.on_message(&self.key, &self.address, payload).await;
                    }
                    Some(SessionCommand::DirectoryAck(ack)) => {
                        if !self.on_ack(ack).await {
                            break;
                        }
                    }
                    Some(SessionCommand::Stop) | None => break,
                },
            }
        }

        self.address_book.remove(&self.address);
        self.inbox.close();
        self.handler.on_stop(&self.key, &self.address).await;
        tracing::debug!(session_key = %self.key, owner = %self.address, "session actor stopped");
    }

    async fn register(&self) {
        if let Err(e) = self
            .directory
            .register(self.key.clone(), self.address.clone())
            .await
        {
            tracing::warn!(session_key = %self.key, error = %e, "register not delivered");
        }
    }

    /// Returns `false` when the actor must stop.
    async fn on_ack(&self, ack: DirectoryAck) -> bool {
        match ack {
            DirectoryAck::Registered | DirectoryAck::Refreshed => {
                tracing::trace!(session_key = %self.key, ?ack, "directory ack");
                true
            }
            DirectoryAck::Missing => {
                tracing::info!(session_key = %self.key, owner = %self.address, "record lapsed, re-registering");
                self.register().await;
                true
            }
            DirectoryAck::Superseded { current } => {
                tracing::warn!(
                    session_key = %self.key,
                    owner = %self.address,
                    current = %current,
                    "superseded by another owner, stopping"
                );
                false
            }
            DirectoryAck::Failed(error) => {
                tracing::warn!(session_key = %self.key, %error, "directory write failed");
                true
            }
        }
    }
}
