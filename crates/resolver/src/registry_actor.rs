//! Actor fronting an [`AgentRegistry`] with the query protocol.
//!
//! Each [`RegistryQuery`] names a node by its path from the search origin;
//! the answer echoes the query's token unchanged.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ar_protocol::{QueryOp, QueryResult, RegistryQuery, RegistryResponse};

use crate::distributed::ReplyTo;
use crate::registry::{resolve_path, AgentRegistry};

#[derive(Debug)]
pub struct RegistryRequest {
    pub query: RegistryQuery,
    pub reply_to: ReplyTo,
}

pub type RegistryMailbox = mpsc::Sender<RegistryRequest>;

/// Answer one query against `registry`.
///
/// A path that does not name a node in the tree is a permanent fault.
pub fn answer(registry: &dyn AgentRegistry, query: &RegistryQuery) -> QueryResult {
    let node = resolve_path(registry, &query.path).and_then(|id| registry.get_agent(&id));
    let Some(agent) = node else {
        return QueryResult::Fault {
            retryable: false,
            message: format!("path {:?} does not name an agent", query.path),
        };
    };

    match query.op {
        QueryOp::HasData => QueryResult::Flag {
            value: agent.declares(&query.key),
        },
        QueryOp::IsLeaf => QueryResult::Flag {
            value: registry.get_children(&agent.id).is_empty(),
        },
        QueryOp::Children => QueryResult::Nodes {
            nodes: registry
                .get_children(&agent.id)
                .into_iter()
                .map(|c| c.as_str().to_owned())
                .collect(),
        },
        QueryOp::ResolveAddress => QueryResult::Address {
            address: agent.address,
        },
    }
}

/// Serve queries from a mailbox of `capacity` until `shutdown` fires.
pub fn spawn_registry(
    registry: Arc<dyn AgentRegistry>,
    capacity: usize,
    shutdown: CancellationToken,
) -> (RegistryMailbox, JoinHandle<()>) {
    let (tx, mut inbox) = mpsc::channel::<RegistryRequest>(capacity.max(1));
    let task = tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = inbox.recv() => match request {
                    Some(r) => r,
                    None => break,
                },
            };
            let result = answer(registry.as_ref(), &request.query);
            let response = RegistryResponse {
                token: request.query.token,
                result,
            };
            if let Err(e) = request.reply_to.send(response).await {
                tracing::debug!(token = %request.query.token, error = %e, "registry reply undeliverable");
            }
        }
        tracing::debug!("registry actor stopped");
    });
    (tx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AgentDescriptor, InMemoryRegistry};
    use ar_domain::CorrelationId;
    use ar_protocol::QueryToken;

    fn registry() -> InMemoryRegistry {
        let reg = InMemoryRegistry::new();
        reg.insert_root(AgentDescriptor::new("A")).unwrap();
        reg.insert_child(&"A".into(), AgentDescriptor::new("B")).unwrap();
        reg.insert_child(
            &"A".into(),
            AgentDescriptor::new("C")
                .with_capabilities(["z"])
                .with_address("tcp://10.0.0.3:7000"),
        )
        .unwrap();
        reg
    }

    fn query(op: QueryOp, path: &[&str], key: &str) -> RegistryQuery {
        RegistryQuery {
            token: QueryToken {
                correlation_id: CorrelationId::new(1),
                seq: 1,
            },
            op,
            path: path.iter().map(|s| s.to_string()).collect(),
            key: key.into(),
        }
    }

    #[test]
    fn answers_predicates_for_the_path_end() {
        let reg = registry();
        assert_eq!(
            answer(&reg, &query(QueryOp::HasData, &["A", "C"], "z")),
            QueryResult::Flag { value: true }
        );
        assert_eq!(
            answer(&reg, &query(QueryOp::HasData, &["A"], "z")),
            QueryResult::Flag { value: false }
        );
        assert_eq!(
            answer(&reg, &query(QueryOp::IsLeaf, &["A", "B"], "z")),
            QueryResult::Flag { value: true }
        );
        assert_eq!(
            answer(&reg, &query(QueryOp::Children, &["A"], "z")),
            QueryResult::Nodes {
                nodes: vec!["B".into(), "C".into()]
            }
        );
        assert_eq!(
            answer(&reg, &query(QueryOp::ResolveAddress, &["A", "C"], "z")),
            QueryResult::Address {
                address: "tcp://10.0.0.3:7000".into()
            }
        );
    }

    #[test]
    fn broken_path_is_a_permanent_fault() {
        let reg = registry();
        let result = answer(&reg, &query(QueryOp::HasData, &["A", "nope"], "z"));
        assert!(matches!(result, QueryResult::Fault { retryable: false, .. }));
    }
}
