//! Session directory behaviour: single owner per key, TTL liveness,
//! fail-closed store handling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use ar_domain::config::DirectoryConfig;
use ar_domain::error::Error;
use ar_domain::{SessionAddress, SessionKey};
use ar_sessions::{
    spawn_directory, DirectoryHandle, InMemoryTtlStore, SessionAddressBook, SessionCommand,
    SessionHandler, TtlStore,
};

// ── Fixtures ────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    delivered: Mutex<Vec<(SessionAddress, Value)>>,
    stopped: Mutex<Vec<SessionAddress>>,
}

#[async_trait]
impl SessionHandler for Recorder {
    async fn on_message(&self, _key: &SessionKey, address: &SessionAddress, payload: Value) {
        self.delivered.lock().push((address.clone(), payload));
    }

    async fn on_stop(&self, _key: &SessionKey, address: &SessionAddress) {
        self.stopped.lock().push(address.clone());
    }
}

struct Harness {
    directory: DirectoryHandle,
    store: Arc<InMemoryTtlStore>,
    book: Arc<SessionAddressBook>,
    recorder: Arc<Recorder>,
    _shutdown: CancellationToken,
}

fn config() -> DirectoryConfig {
    DirectoryConfig {
        ttl_secs: 30,
        heartbeat_secs: 10,
        ..Default::default()
    }
}

fn harness(config: DirectoryConfig) -> Harness {
    let store = Arc::new(InMemoryTtlStore::new());
    let book = Arc::new(SessionAddressBook::new());
    let recorder = Arc::new(Recorder::default());
    let shutdown = CancellationToken::new();
    let (directory, _) = spawn_directory(
        &config,
        store.clone(),
        book.clone(),
        recorder.clone(),
        shutdown.clone(),
    )
    .unwrap();
    Harness {
        directory,
        store,
        book,
        recorder,
        _shutdown: shutdown,
    }
}

fn key() -> SessionKey {
    SessionKey::new("acme", "support-bot")
}

/// Let spawned actors drain their mailboxes.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ── Affinity ────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_first_routes_spawn_exactly_one_owner() {
    let h = harness(config());

    let routes = (0..25).map(|i| {
        let directory = h.directory.clone();
        async move { directory.route(key(), json!({ "n": i })).await.unwrap() }
    });
    let receipts = futures_util::future::join_all(routes).await;

    let owner = receipts[0].owner.clone();
    assert!(receipts.iter().all(|r| r.owner == owner));
    assert_eq!(receipts.iter().filter(|r| r.spawned).count(), 1);
    assert_eq!(h.book.len(), 1);
    assert_eq!(h.store.len(), 1);

    settle().await;
    let delivered = h.recorder.delivered.lock();
    assert_eq!(delivered.len(), 25);
    assert!(delivered.iter().all(|(addr, _)| *addr == owner));
}

#[tokio::test]
async fn distinct_keys_get_distinct_owners() {
    let h = harness(config());
    let a = h.directory.route(SessionKey::new("acme", "a"), json!(1)).await.unwrap();
    let b = h.directory.route(SessionKey::new("acme", "b"), json!(2)).await.unwrap();
    assert_ne!(a.owner, b.owner);
    assert!(a.spawned && b.spawned);
}

#[tokio::test]
async fn register_from_an_unknown_owner_is_ignored() {
    let h = harness(config());
    let first = h.directory.route(key(), json!("hi")).await.unwrap();

    // Not a live session of this directory: ignored.
    let intruder = SessionAddress::mint();
    h.directory.register(key(), intruder).await.unwrap();

    let entry = h.directory.lookup(key()).await.unwrap().unwrap();
    assert_eq!(entry.owner, first.owner);
    assert!(entry.live);
}

#[tokio::test(start_paused = true)]
async fn displaced_owner_stops_on_its_next_heartbeat() {
    let h = harness(config());
    let first = h.directory.route(key(), json!(1)).await.unwrap();
    settle().await;

    // Record lost while the first owner keeps running; a new route wins.
    h.store.delete("session:acme:support-bot").await.unwrap();
    let second = h.directory.route(key(), json!(2)).await.unwrap();
    assert!(second.spawned);
    assert!(h.book.is_live(&first.owner));

    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;

    assert!(!h.book.is_live(&first.owner));
    assert!(h.book.is_live(&second.owner));
    let entry = h.directory.lookup(key()).await.unwrap().unwrap();
    assert_eq!(entry.owner, second.owner);
}

#[tokio::test]
async fn register_onto_a_key_held_by_another_live_owner_is_superseded() {
    let h = harness(config());
    let first = h.directory.route(key(), json!(1)).await.unwrap();
    settle().await;

    h.store.delete("session:acme:support-bot").await.unwrap();
    let second = h.directory.route(key(), json!(2)).await.unwrap();
    assert!(second.spawned);
    settle().await;
    assert!(h.book.is_live(&first.owner));

    // No heartbeat has fired yet; the register alone displaces the first owner.
    h.directory.register(key(), first.owner.clone()).await.unwrap();
    settle().await;

    assert!(!h.book.is_live(&first.owner));
    assert!(h.book.is_live(&second.owner));
    let entry = h.directory.lookup(key()).await.unwrap().unwrap();
    assert_eq!(entry.owner, second.owner);
    assert_eq!(h.recorder.stopped.lock().as_slice(), [first.owner]);
}

// ── TTL liveness ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn heartbeating_owner_is_never_evicted() {
    let h = harness(config());
    let first = h.directory.route(key(), json!("start")).await.unwrap();

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(25)).await;
        let receipt = h.directory.route(key(), json!("again")).await.unwrap();
        assert_eq!(receipt.owner, first.owner);
        assert!(!receipt.spawned);
    }
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_owner_lapses_within_ttl_and_is_replaced() {
    let h = harness(config());
    let first = h.directory.route(key(), json!("start")).await.unwrap();
    settle().await;

    // Stop the owner without telling the directory.
    let mailbox = h.book.live(&first.owner).unwrap();
    mailbox.send(SessionCommand::Stop).await.unwrap();
    settle().await;
    assert!(!h.book.is_live(&first.owner));

    // Record still present until the TTL lapses.
    let entry = h.directory.lookup(key()).await.unwrap().unwrap();
    assert!(!entry.live);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.store.is_empty());

    let next = h.directory.route(key(), json!("later")).await.unwrap();
    assert!(next.spawned);
    assert_ne!(next.owner, first.owner);
    assert_eq!(h.recorder.stopped.lock().as_slice(), [first.owner]);
}

#[tokio::test]
async fn hit_on_a_stopped_owner_spawns_a_fresh_one() {
    let h = harness(config());
    let first = h.directory.route(key(), json!(1)).await.unwrap();

    h.book.live(&first.owner).unwrap().send(SessionCommand::Stop).await.unwrap();
    settle().await;

    let second = h.directory.route(key(), json!(2)).await.unwrap();
    assert!(second.spawned);
    assert_ne!(second.owner, first.owner);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn owner_re_registers_after_its_record_lapses() {
    let h = harness(config());
    let first = h.directory.route(key(), json!("start")).await.unwrap();
    settle().await;

    // Drop the record behind the directory's back.
    h.store.delete("session:acme:support-bot").await.unwrap();
    assert!(h.directory.lookup(key()).await.unwrap().is_none());

    // Next heartbeat: refresh → Missing → register.
    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;

    let entry = h.directory.lookup(key()).await.unwrap().unwrap();
    assert_eq!(entry.owner, first.owner);
}

#[tokio::test]
async fn refresh_of_a_missing_key_writes_nothing() {
    let h = harness(config());
    h.directory
        .refresh_ttl(key(), SessionAddress::mint())
        .await
        .unwrap();
    assert!(h.directory.lookup(key()).await.unwrap().is_none());
    assert!(h.store.is_empty());
}

// ── Failure handling ────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_store_fails_closed() {
    let h = harness(config());
    h.store.set_reachable(false);

    let err = h.directory.route(key(), json!("x")).await.unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert!(h.book.is_empty());

    h.store.set_reachable(true);
    let receipt = h.directory.route(key(), json!("x")).await.unwrap();
    assert!(receipt.spawned);
}

#[tokio::test]
async fn explicit_evict_stops_the_owner() {
    let h = harness(config());
    let first = h.directory.route(key(), json!(1)).await.unwrap();

    assert!(h.directory.evict(key()).await.unwrap());
    assert!(!h.directory.evict(key()).await.unwrap());
    settle().await;
    assert!(!h.book.is_live(&first.owner));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn malformed_keys_are_rejected_before_the_directory() {
    let h = harness(config());
    let err = h
        .directory
        .route(SessionKey::new("", "node"), json!(null))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

/// Never finishes handling a payload.
struct Stuck;

#[async_trait]
impl SessionHandler for Stuck {
    async fn on_message(&self, _key: &SessionKey, _address: &SessionAddress, _payload: Value) {
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn full_owner_mailbox_fails_the_route_without_evicting() {
    let store = Arc::new(InMemoryTtlStore::new());
    let book = Arc::new(SessionAddressBook::new());
    let shutdown = CancellationToken::new();
    let (directory, _) = spawn_directory(
        &DirectoryConfig {
            session_mailbox_capacity: 1,
            ..config()
        },
        store.clone(),
        book.clone(),
        Arc::new(Stuck),
        shutdown.clone(),
    )
    .unwrap();

    let first = directory.route(key(), json!(1)).await.unwrap();
    settle().await;

    // The owner is stuck on payload 1; its single slot fills up.
    let _ = directory.route(key(), json!(2)).await;
    let err = directory.route(key(), json!(3)).await.unwrap_err();
    assert!(matches!(err, Error::Mailbox(_)), "got {err:?}");

    let entry = directory.lookup(key()).await.unwrap().unwrap();
    assert_eq!(entry.owner, first.owner);
    assert!(entry.live);
    assert_eq!(book.len(), 1);
    shutdown.cancel();
}

#[test]
fn heartbeat_not_below_ttl_is_refused() {
    let result = spawn_directory(
        &DirectoryConfig {
            ttl_secs: 10,
            heartbeat_secs: 10,
            ..Default::default()
        },
        Arc::new(InMemoryTtlStore::new()),
        Arc::new(SessionAddressBook::new()),
        Arc::new(Recorder::default()),
        CancellationToken::new(),
    );
    assert!(matches!(result, Err(Error::Config(_))));
}
