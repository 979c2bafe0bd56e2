use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use ar_domain::config::ResolverConfig;
use ar_domain::trace::TraceEvent;
use ar_domain::CorrelationId;
use ar_protocol::{
    DataSourceFound, DataSourceNotFound, NotFoundReason, QueryOp, QueryResult, QueryToken,
    RegistryQuery, RegistryResponse, ResolutionReply,
};

use super::handle::ResolverHandle;
use super::state::{Advance, PendingQuery, SearchState, Step};
use super::{ReplyTo, ResolverMessage, ResolverStats, RouteDataQuery};
use crate::registry_actor::{RegistryMailbox, RegistryRequest};
use crate::retry::RetryPolicy;

/// Why a query attempt failed.
enum AttemptFailure {
    Timeout,
    Fault(String),
}

struct DistributedResolutionActor {
    inbox: mpsc::Receiver<ResolverMessage>,
    /// Own mailbox, for timers and registry replies.
    myself: mpsc::Sender<ResolverMessage>,
    registry: RegistryMailbox,
    searches: HashMap<CorrelationId, SearchState>,
    next_id: u64,
    query_timeout: Duration,
    max_hops: u32,
    retry: RetryPolicy,
    stats: ResolverStats,
    shutdown: CancellationToken,
}

/// Start the resolution actor.  It runs until `shutdown` fires, then fails
/// every in-flight request with [`NotFoundReason::Shutdown`].
pub fn spawn_resolver(
    config: &ResolverConfig,
    registry: RegistryMailbox,
    shutdown: CancellationToken,
) -> (ResolverHandle, JoinHandle<()>) {
    let (tx, inbox) = mpsc::channel(config.mailbox_capacity.max(1));
    let actor = DistributedResolutionActor {
        inbox,
        myself: tx.clone(),
        registry,
        searches: HashMap::new(),
        next_id: 0,
        query_timeout: config.query_timeout(),
        max_hops: config.max_hops,
        retry: RetryPolicy::from_config(config),
        stats: ResolverStats::default(),
        shutdown,
    };
    let task = tokio::spawn(actor.run());
    (ResolverHandle::new(tx), task)
}

/// Post `msg` back to the actor after `delay`.
fn schedule(
    myself: &mpsc::Sender<ResolverMessage>,
    delay: Duration,
    msg: ResolverMessage,
) -> AbortHandle {
    let tx = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(msg).await;
    })
    .abort_handle()
}

impl DistributedResolutionActor {
    async fn run(mut self) {
        tracing::info!(
            query_timeout_ms = self.query_timeout.as_millis() as u64,
            max_retries = self.retry.max_retries,
            max_hops = self.max_hops,
            "distributed resolver started"
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                msg = self.inbox.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
            }
        }

        let in_flight: Vec<CorrelationId> = self.searches.keys().copied().collect();
        for id in in_flight {
            self.finish_not_found(id, NotFoundReason::Shutdown);
        }
        tracing::info!("distributed resolver stopped");
    }

    fn handle(&mut self, msg: ResolverMessage) {
        match msg {
            ResolverMessage::Route(query) => self.on_route(query),
            ResolverMessage::Registry(response) => self.on_registry_response(response),
            ResolverMessage::QueryTimedOut(token) => self.on_timeout(token),
            ResolverMessage::RetryDue(token) => self.on_retry_due(token),
            ResolverMessage::Stats(reply) => {
                let _ = reply.send(ResolverStats {
                    in_flight: self.searches.len(),
                    ..self.stats.clone()
                });
            }
        }
    }

    // ── Request arrival ─────────────────────────────────────────────

    fn on_route(&mut self, query: RouteDataQuery) {
        self.next_id += 1;
        let id = CorrelationId::new(self.next_id);

        TraceEvent::ResolutionStarted {
            correlation_id: id.get(),
            context_path: query.context_path.clone(),
            key: query.key.to_string(),
        }
        .emit();

        let mut state = SearchState::new(
            id,
            query.key,
            query.context_path,
            self.max_hops,
            Some(query.requester),
        );
        let step = state.start();
        self.searches.insert(id, state);
        self.stats.started += 1;
        self.apply(id, step);
    }

    fn apply(&mut self, id: CorrelationId, step: Step) {
        match step {
            Step::Query(op) => self.issue(id, op, 1),
            Step::Fail(reason) => self.finish_not_found(id, reason),
        }
    }

    /// Send `op` for the request's current path under a fresh token.
    fn issue(&mut self, id: CorrelationId, op: QueryOp, attempt: u32) {
        let Some(state) = self.searches.get_mut(&id) else {
            return;
        };
        let token = state.next_token();
        state.queries += 1;

        let request = RegistryRequest {
            query: RegistryQuery {
                token,
                op,
                path: state.path.clone(),
                key: state.key.clone(),
            },
            reply_to: ReplyTo::new(self.myself.clone()),
        };
        tracing::debug!(%token, ?op, path = ?state.path, attempt, "registry query");

        match self.registry.try_send(request) {
            Ok(()) => {
                let timer = schedule(
                    &self.myself,
                    self.query_timeout,
                    ResolverMessage::QueryTimedOut(token),
                );
                state.pending = Some(PendingQuery {
                    token,
                    op,
                    attempt,
                    timer: Some(timer),
                    backing_off: false,
                });
            }
            Err(e) => {
                state.pending = Some(PendingQuery {
                    token,
                    op,
                    attempt,
                    timer: None,
                    backing_off: false,
                });
                tracing::warn!(%token, error = %e, "registry mailbox rejected query");
                self.retry_or_fail(id, AttemptFailure::Fault(format!("registry mailbox: {e}")));
            }
        }
    }

    // ── Reply dispatch ──────────────────────────────────────────────

    fn on_registry_response(&mut self, response: RegistryResponse) {
        let RegistryResponse { token, result } = response;
        let id = token.correlation_id;

        let Some(state) = self.searches.get_mut(&id) else {
            self.stats.unmatched_replies += 1;
            tracing::warn!(%token, "registry reply matches no in-flight request");
            return;
        };

        let mismatch = match &state.pending {
            None => Some(format!("reply {token} arrived with no query pending")),
            Some(pending) if token.seq < pending.token.seq => {
                self.stats.stale_replies += 1;
                tracing::debug!(%token, current = %pending.token, "stale registry reply discarded");
                return;
            }
            Some(pending) if token.seq != pending.token.seq => Some(format!(
                "reply {token} is ahead of pending query {}",
                pending.token
            )),
            Some(pending) if !pending.op.accepts(&result) => Some(format!(
                "{:?} query {} answered with {result:?}",
                pending.op, pending.token
            )),
            Some(_) => None,
        };
        if let Some(detail) = mismatch {
            tracing::error!(correlation_id = %id, %detail, "correlation error");
            self.finish_not_found(id, NotFoundReason::Correlation { detail });
            return;
        }

        let Some(pending) = state.pending.as_mut() else {
            return;
        };
        pending.disarm();
        let op = pending.op;

        match result {
            QueryResult::Fault {
                retryable: true,
                message,
            } => {
                tracing::warn!(%token, %message, "registry fault, will retry");
                self.retry_or_fail(id, AttemptFailure::Fault(message));
            }
            QueryResult::Fault {
                retryable: false,
                message,
            } => {
                self.finish_not_found(id, NotFoundReason::RegistryFault { message });
            }
            result => {
                state.pending = None;
                match state.on_answer(op, result) {
                    Advance::Enter(phase) => {
                        let step = state.enter(phase);
                        self.apply(id, step);
                    }
                    Advance::Resolved(address) => self.finish_found(id, address),
                }
            }
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    fn on_timeout(&mut self, token: QueryToken) {
        let Some(state) = self.searches.get(&token.correlation_id) else {
            return;
        };
        match &state.pending {
            Some(p) if p.token == token && !p.backing_off => {}
            // Answered, retried or finished in the meantime.
            _ => return,
        }
        tracing::warn!(%token, "registry query timed out");
        self.retry_or_fail(token.correlation_id, AttemptFailure::Timeout);
    }

    fn on_retry_due(&mut self, token: QueryToken) {
        let Some(state) = self.searches.get(&token.correlation_id) else {
            return;
        };
        let (op, attempt) = match &state.pending {
            Some(p) if p.token == token && p.backing_off => (p.op, p.attempt),
            _ => return,
        };
        self.issue(token.correlation_id, op, attempt + 1);
    }

    /// Retry the pending query within budget, or fail the request.
    /// Timeouts are re-sent at once; faults wait out a back-off first.
    fn retry_or_fail(&mut self, id: CorrelationId, failure: AttemptFailure) {
        let Some(state) = self.searches.get_mut(&id) else {
            return;
        };
        let Some(pending) = state.pending.as_mut() else {
            return;
        };
        pending.disarm();

        if !self.retry.may_retry(pending.attempt) {
            let reason = match failure {
                AttemptFailure::Timeout => NotFoundReason::Timeout {
                    attempts: pending.attempt,
                },
                AttemptFailure::Fault(message) => NotFoundReason::RegistryFault { message },
            };
            self.finish_not_found(id, reason);
            return;
        }

        match failure {
            AttemptFailure::Timeout => {
                let (op, attempt) = (pending.op, pending.attempt + 1);
                self.issue(id, op, attempt);
            }
            AttemptFailure::Fault(_) => {
                let delay = self.retry.backoff(pending.token, pending.attempt);
                pending.backing_off = true;
                pending.timer = Some(schedule(
                    &self.myself,
                    delay,
                    ResolverMessage::RetryDue(pending.token),
                ));
            }
        }
    }

    // ── Terminal replies ────────────────────────────────────────────

    fn finish_found(&mut self, id: CorrelationId, address: String) {
        let Some(state) = self.searches.remove(&id) else {
            return;
        };
        self.stats.found += 1;
        let reply = ResolutionReply::DataSourceFound(DataSourceFound {
            correlation_id: id,
            address,
            path: state.path.clone(),
        });
        Self::deliver(state, "found", reply);
    }

    fn finish_not_found(&mut self, id: CorrelationId, reason: NotFoundReason) {
        let Some(mut state) = self.searches.remove(&id) else {
            return;
        };
        if let Some(pending) = state.pending.as_mut() {
            pending.disarm();
        }
        self.stats.not_found += 1;
        let outcome = match &reason {
            NotFoundReason::Exhausted => "exhausted",
            NotFoundReason::Timeout { .. } => "timeout",
            NotFoundReason::RegistryFault { .. } => "registry_fault",
            NotFoundReason::Correlation { .. } => "correlation",
            NotFoundReason::HopLimit { .. } => "hop_limit",
            NotFoundReason::Shutdown => "shutdown",
        };
        let reply = ResolutionReply::DataSourceNotFound(DataSourceNotFound {
            correlation_id: id,
            reason,
        });
        Self::deliver(state, outcome, reply);
    }

    fn deliver(mut state: SearchState, outcome: &str, reply: ResolutionReply) {
        TraceEvent::ResolutionFinished {
            correlation_id: state.correlation_id.get(),
            outcome: outcome.to_string(),
            hops: state.hops,
            queries: state.queries,
        }
        .emit();

        if let Some(requester) = state.requester.take() {
            if requester.send(reply).is_err() {
                tracing::debug!(
                    correlation_id = %state.correlation_id,
                    "requester went away before the reply"
                );
            }
        }
    }
}
