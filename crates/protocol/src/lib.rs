//! Arbor protocol: registry query messages and caller-facing replies.
//!
//! Two conversations are defined here:
//!
//! - **Registry queries**: the distributed resolver asks the registry
//!   `has_data`, `is_leaf`, `children` and `resolve_address` about a path.
//!   Every query carries a [`QueryToken`]; the registry must echo it back
//!   unchanged so the resolver can dispatch the reply to exactly one
//!   in-flight request.
//! - **Caller messages**: what a caller sends to locate a data source or
//!   reach a session, and what it gets back.

use serde::{Deserialize, Serialize};

use ar_domain::{CorrelationId, DataKey};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry query protocol
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Echoed on every registry reply.  `seq` increases with each query a
/// single request issues, so a late reply to a retried attempt is told
/// apart from the reply to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryToken {
    pub correlation_id: CorrelationId,
    pub seq: u32,
}

impl std::fmt::Display for QueryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.correlation_id, self.seq)
    }
}

/// A predicate the resolver can ask about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOp {
    /// Does the node at the end of the path declare the requested key?
    HasData,
    /// Does the node at the end of the path have no children?
    IsLeaf,
    /// Children of the node at the end of the path, in registry order.
    Children,
    /// Concrete address of the node at the end of the path.
    ResolveAddress,
}

impl QueryOp {
    /// Whether `result` has the shape this op expects.
    pub fn accepts(self, result: &QueryResult) -> bool {
        matches!(
            (self, result),
            (Self::HasData | Self::IsLeaf, QueryResult::Flag { .. })
                | (Self::Children, QueryResult::Nodes { .. })
                | (Self::ResolveAddress, QueryResult::Address { .. })
                | (_, QueryResult::Fault { .. })
        )
    }
}

/// Resolver → registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryQuery {
    pub token: QueryToken,
    pub op: QueryOp,
    /// Tree-node names from the search origin down to the node in question.
    pub path: Vec<String>,
    pub key: DataKey,
}

/// Registry → resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryResponse {
    pub token: QueryToken,
    pub result: QueryResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    Flag { value: bool },
    Nodes { nodes: Vec<String> },
    Address { address: String },
    /// The registry could not answer.  `retryable` faults are retried
    /// within the request's budget; the others fail the request at once.
    Fault { retryable: bool, message: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Caller-facing messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Body of a data-source lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuery {
    pub context_path: Vec<String>,
    pub key: DataKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceFound {
    pub correlation_id: CorrelationId,
    pub address: String,
    /// Path the search ended on.
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceNotFound {
    pub correlation_id: CorrelationId,
    pub reason: NotFoundReason,
}

/// Why a lookup ended without a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotFoundReason {
    /// The search walked its path and found nothing.
    Exhausted,
    /// A registry query stayed unanswered past the retry budget.
    Timeout { attempts: u32 },
    /// The registry refused the query.
    RegistryFault { message: String },
    /// A reply could not be matched to this request's pending query.
    Correlation { detail: String },
    /// The request exceeded its state-transition budget.
    HopLimit { hops: u32 },
    /// The resolver stopped before the request finished.
    Shutdown,
}

/// Terminal reply to a data-source lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionReply {
    DataSourceFound(DataSourceFound),
    DataSourceNotFound(DataSourceNotFound),
}

impl ResolutionReply {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::DataSourceFound(f) => f.correlation_id,
            Self::DataSourceNotFound(n) => n.correlation_id,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Self::DataSourceFound(f) => Some(&f.address),
            Self::DataSourceNotFound(_) => None,
        }
    }
}

/// Deliver `payload` to the session owning `(tenant_id, node_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSessionRequest {
    pub tenant_id: String,
    pub node_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_is_tagged_by_kind() {
        let json = serde_json::to_value(QueryResult::Flag { value: true }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "flag", "value": true}));
    }

    #[test]
    fn op_accepts_only_matching_shapes() {
        let flag = QueryResult::Flag { value: false };
        let nodes = QueryResult::Nodes { nodes: vec![] };
        let fault = QueryResult::Fault {
            retryable: true,
            message: "busy".into(),
        };
        assert!(QueryOp::HasData.accepts(&flag));
        assert!(!QueryOp::HasData.accepts(&nodes));
        assert!(QueryOp::Children.accepts(&nodes));
        assert!(!QueryOp::ResolveAddress.accepts(&flag));
        assert!(QueryOp::IsLeaf.accepts(&fault));
    }

    #[test]
    fn not_found_reply_round_trips_through_json() {
        let reply = ResolutionReply::DataSourceNotFound(DataSourceNotFound {
            correlation_id: CorrelationId::new(7),
            reason: NotFoundReason::Timeout { attempts: 4 },
        });
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"type\":\"data_source_not_found\""));
        let back: ResolutionReply = serde_json::from_str(&json).unwrap();
        assert_eq!(back.correlation_id(), CorrelationId::new(7));
        assert!(back.address().is_none());
    }
}
