//! Distributed resolver against a live registry actor and against
//! hand-driven registry mailboxes.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ar_domain::config::ResolverConfig;
use ar_domain::CorrelationId;
use ar_protocol::{
    NotFoundReason, QueryOp, QueryResult, QueryToken, RegistryResponse, ResolutionReply,
};
use ar_resolver::registry_actor::answer;
use ar_resolver::{
    spawn_registry, spawn_resolver, AgentDescriptor, InMemoryRegistry, RegistryRequest,
    ResolverHandle,
};

// ── Fixtures ────────────────────────────────────────────────────────

/// A(root) → [B, C], B → [D]; D declares "x", C declares "z".
fn tree() -> Arc<InMemoryRegistry> {
    let reg = InMemoryRegistry::new();
    reg.insert_root(AgentDescriptor::new("A")).unwrap();
    reg.insert_child(&"A".into(), AgentDescriptor::new("B")).unwrap();
    reg.insert_child(&"A".into(), AgentDescriptor::new("C").with_capabilities(["z"]))
        .unwrap();
    reg.insert_child(&"B".into(), AgentDescriptor::new("D").with_capabilities(["x"]))
        .unwrap();
    Arc::new(reg)
}

fn config() -> ResolverConfig {
    ResolverConfig {
        query_timeout_ms: 500,
        max_retries: 2,
        retry_backoff_ms: 50,
        ..Default::default()
    }
}

fn path(nodes: &[&str]) -> Vec<String> {
    nodes.iter().map(|s| s.to_string()).collect()
}

/// Resolver wired to a real registry actor.
fn live(config: ResolverConfig) -> (ResolverHandle, CancellationToken) {
    let shutdown = CancellationToken::new();
    let (mailbox, _) = spawn_registry(tree(), 64, shutdown.clone());
    let (handle, _) = spawn_resolver(&config, mailbox, shutdown.clone());
    (handle, shutdown)
}

/// Resolver whose registry mailbox the test drives by hand.
fn manual(config: ResolverConfig) -> (ResolverHandle, mpsc::Receiver<RegistryRequest>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let (mailbox, rx) = mpsc::channel(64);
    let (handle, _) = spawn_resolver(&config, mailbox, shutdown.clone());
    (handle, rx, shutdown)
}

async fn respond(req: &RegistryRequest, result: QueryResult) {
    req.reply_to
        .send(RegistryResponse {
            token: req.query.token,
            result,
        })
        .await
        .unwrap();
}

/// Answer every remaining query truthfully.
fn serve(mut rx: mpsc::Receiver<RegistryRequest>, reg: Arc<InMemoryRegistry>) {
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            let result = answer(reg.as_ref(), &req.query);
            respond(&req, result).await;
        }
    });
}

fn not_found_reason(reply: ResolutionReply) -> NotFoundReason {
    match reply {
        ResolutionReply::DataSourceNotFound(n) => n.reason,
        ResolutionReply::DataSourceFound(f) => panic!("expected not found, got {f:?}"),
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

#[tokio::test]
async fn finds_leaf_provider_down_the_first_child_chain() {
    let (handle, _shutdown) = live(config());
    let reply = handle.resolve(path(&["A"]), "x").await.unwrap();
    match reply {
        ResolutionReply::DataSourceFound(found) => {
            assert_eq!(found.address, "agent://D");
            assert_eq!(found.path, ["A", "B", "D"]);
        }
        other => panic!("expected found, got {other:?}"),
    }

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.found, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn sibling_provider_is_found_on_the_way_up() {
    let (handle, _shutdown) = live(config());
    let reply = handle.resolve(path(&["A", "B"]), "z").await.unwrap();
    match reply {
        ResolutionReply::DataSourceFound(found) => {
            assert_eq!(found.address, "agent://C");
            assert_eq!(found.path, ["A", "C"]);
        }
        other => panic!("expected found, got {other:?}"),
    }
}

#[tokio::test]
async fn upward_walk_asks_only_for_children_and_sibling_data() {
    let reg = tree();
    let (handle, mut rx, _shutdown) = manual(config());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = seen.clone();
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            log.lock().push((req.query.op, req.query.path.clone()));
            let result = answer(reg.as_ref(), &req.query);
            respond(&req, result).await;
        }
    });

    let reply = handle.resolve(path(&["A", "B"]), "nothing").await.unwrap();
    assert_eq!(not_found_reason(reply), NotFoundReason::Exhausted);
    assert_eq!(
        *seen.lock(),
        [
            (QueryOp::HasData, path(&["A", "B"])),
            (QueryOp::Children, path(&["A", "B"])),
            (QueryOp::HasData, path(&["A", "B", "D"])),
            (QueryOp::Children, path(&["A", "B", "D"])),
            (QueryOp::Children, path(&["A"])),
            (QueryOp::HasData, path(&["A", "C"])),
        ]
    );
}

#[tokio::test]
async fn empty_context_path_fails_without_querying() {
    let (handle, mut rx, _shutdown) = manual(config());
    let reply = handle.resolve(Vec::new(), "x").await.unwrap();
    assert_eq!(not_found_reason(reply), NotFoundReason::Exhausted);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn hop_limit_fails_the_request() {
    let (handle, _shutdown) = live(ResolverConfig {
        max_hops: 3,
        ..config()
    });
    let reply = handle.resolve(path(&["A"]), "x").await.unwrap();
    assert_eq!(not_found_reason(reply), NotFoundReason::HopLimit { hops: 3 });
}

// ── Correlation ─────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_requests_get_their_own_answers_under_reordering() {
    let reg = tree();
    let (handle, mut rx, _shutdown) = manual(config());

    // Answer in reverse arrival order within each batch.
    let responder_reg = reg.clone();
    tokio::spawn(async move {
        let mut batch = Vec::new();
        while let Some(first) = rx.recv().await {
            batch.push(first);
            while let Ok(more) = rx.try_recv() {
                batch.push(more);
            }
            for req in batch.drain(..).rev() {
                let result = answer(responder_reg.as_ref(), &req.query);
                respond(&req, result).await;
            }
        }
    });

    let requests = (0..40).map(|i| {
        let handle = handle.clone();
        async move {
            let (start, key, expected) = if i % 2 == 0 {
                (path(&["A"]), "x", "agent://D")
            } else {
                (path(&["A", "C"]), "z", "agent://C")
            };
            (handle.resolve(start, key).await.unwrap(), expected)
        }
    });
    let results = futures_util::future::join_all(requests).await;

    let mut ids = HashSet::new();
    for (reply, expected) in results {
        assert_eq!(reply.address(), Some(expected));
        ids.insert(reply.correlation_id());
    }
    assert_eq!(ids.len(), 40);
}

#[tokio::test]
async fn reply_for_unknown_correlation_id_is_counted_and_ignored() {
    let (handle, mut rx, _shutdown) = manual(config());
    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.resolve(path(&["A", "C"]), "z").await }
    });

    let first = rx.recv().await.unwrap();
    first
        .reply_to
        .send(RegistryResponse {
            token: QueryToken {
                correlation_id: CorrelationId::new(999),
                seq: 1,
            },
            result: QueryResult::Flag { value: false },
        })
        .await
        .unwrap();
    respond(&first, answer(tree().as_ref(), &first.query)).await;
    serve(rx, tree());

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply.address(), Some("agent://C"));
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.unmatched_replies, 1);
    assert_eq!(stats.found, 1);
}

#[tokio::test]
async fn reply_of_the_wrong_shape_fails_with_correlation_error() {
    let (handle, mut rx, _shutdown) = manual(config());
    let pending = tokio::spawn(async move { handle.resolve(path(&["A"]), "x").await });

    let req = rx.recv().await.unwrap();
    assert_eq!(req.query.op, QueryOp::HasData);
    respond(&req, QueryResult::Nodes { nodes: vec!["B".into()] }).await;

    let reason = not_found_reason(pending.await.unwrap().unwrap());
    assert!(matches!(reason, NotFoundReason::Correlation { .. }));
}

#[tokio::test]
async fn reply_ahead_of_the_pending_query_fails_with_correlation_error() {
    let (handle, mut rx, _shutdown) = manual(config());
    let pending = tokio::spawn(async move { handle.resolve(path(&["A"]), "x").await });

    let req = rx.recv().await.unwrap();
    let mut token = req.query.token;
    token.seq += 1;
    req.reply_to
        .send(RegistryResponse {
            token,
            result: QueryResult::Flag { value: false },
        })
        .await
        .unwrap();

    let reason = not_found_reason(pending.await.unwrap().unwrap());
    assert!(matches!(reason, NotFoundReason::Correlation { .. }));
}

#[tokio::test(start_paused = true)]
async fn late_reply_to_a_retried_query_is_discarded() {
    let (handle, mut rx, _shutdown) = manual(config());
    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.resolve(path(&["A", "C"]), "z").await }
    });

    let first = rx.recv().await.unwrap();
    // Left unanswered: the timeout re-sends the query under a new token.
    let second = rx.recv().await.unwrap();
    assert_eq!(second.query.op, QueryOp::HasData);
    assert!(second.query.token.seq > first.query.token.seq);

    // Would be a correlation error if it were applied.
    respond(&first, QueryResult::Nodes { nodes: vec![] }).await;
    respond(&second, QueryResult::Flag { value: true }).await;
    serve(rx, tree());

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply.address(), Some("agent://C"));
    assert_eq!(handle.stats().await.unwrap().stale_replies, 1);
}

// ── Timeouts and faults ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unanswered_query_times_out_after_the_retry_budget() {
    let (handle, mut rx, _shutdown) = manual(config());
    let reply = handle.resolve(path(&["A"]), "x").await.unwrap();
    assert_eq!(
        not_found_reason(reply),
        NotFoundReason::Timeout { attempts: 3 }
    );

    let mut seqs = Vec::new();
    while let Ok(req) = rx.try_recv() {
        assert_eq!(req.query.op, QueryOp::HasData);
        seqs.push(req.query.token.seq);
    }
    assert_eq!(seqs, [1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn retryable_fault_is_retried_after_backoff() {
    let (handle, mut rx, _shutdown) = manual(config());
    let pending = tokio::spawn(async move { handle.resolve(path(&["A", "C"]), "z").await });

    let first = rx.recv().await.unwrap();
    respond(
        &first,
        QueryResult::Fault {
            retryable: true,
            message: "registry busy".into(),
        },
    )
    .await;

    let retried = rx.recv().await.unwrap();
    assert_eq!(retried.query.op, QueryOp::HasData);
    assert!(retried.query.token.seq > first.query.token.seq);
    respond(&retried, answer(tree().as_ref(), &retried.query)).await;
    serve(rx, tree());

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply.address(), Some("agent://C"));
}

#[tokio::test]
async fn permanent_fault_fails_immediately() {
    let (handle, mut rx, _shutdown) = manual(config());
    let pending = tokio::spawn(async move { handle.resolve(path(&["A"]), "x").await });

    let req = rx.recv().await.unwrap();
    respond(
        &req,
        QueryResult::Fault {
            retryable: false,
            message: "no such tree".into(),
        },
    )
    .await;

    let reason = not_found_reason(pending.await.unwrap().unwrap());
    assert_eq!(
        reason,
        NotFoundReason::RegistryFault {
            message: "no such tree".into()
        }
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn closed_registry_mailbox_exhausts_retries_as_fault() {
    let (handle, rx, _shutdown) = manual(config());
    drop(rx);
    let reason = not_found_reason(handle.resolve(path(&["A"]), "x").await.unwrap());
    match reason {
        NotFoundReason::RegistryFault { message } => assert!(message.contains("registry mailbox")),
        other => panic!("expected registry fault, got {other:?}"),
    }
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_fails_in_flight_requests() {
    let (handle, mut rx, shutdown) = manual(ResolverConfig {
        query_timeout_ms: 60_000,
        ..config()
    });
    let pending = tokio::spawn(async move { handle.resolve(path(&["A"]), "x").await });

    let _held = rx.recv().await.unwrap();
    shutdown.cancel();

    let reason = not_found_reason(pending.await.unwrap().unwrap());
    assert_eq!(reason, NotFoundReason::Shutdown);
}
