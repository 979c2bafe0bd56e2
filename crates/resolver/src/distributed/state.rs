//! Per-request search state and the transition table it follows.
//!
//! Downward, along the first-child chain:
//!
//! | Phase            | Query            | true / non-empty   | false / empty     |
//! |------------------|------------------|--------------------|-------------------|
//! | `SearchLocal`    | `has_data`       | `CheckLeaf`        | `SearchChildren`  |
//! | `CheckLeaf`      | `is_leaf`        | `Found`            | `SearchChildren`  |
//! | `SearchChildren` | `children`       | `TryChildren`      | `SearchParent`    |
//! | `TryChildren`    | n/a (push)       | `SearchLocal`      |                   |
//! | `Found`          | `resolve_address`| reply found        |                   |
//!
//! Upward, once the descent is exhausted:
//!
//! | Phase            | Query            | true / non-empty   | false / empty     |
//! |------------------|------------------|--------------------|-------------------|
//! | `SearchParent`   | n/a (pop)        | `SearchSiblings`   | `Failed` (len ≤ 1)|
//! | `SearchSiblings` | `children`       | `TrySiblings`      | `TrySiblings`     |
//! | `TrySiblings`    | n/a (push next)  | `CheckSibling`     | `SearchParent`    |
//! | `CheckSibling`   | `has_data`       | `Found`            | `TrySiblings`     |
//!
//! Only the first child is ever descended into.  On the way up, each
//! level's other children are tested against their *own* declared keys,
//! never their subtrees, which is the lateral rule of
//! [`CapabilityResolver`](crate::CapabilityResolver).  Ancestors are not
//! candidates.  Children lists fetched on the way down are reused on the
//! way up, so `SearchSiblings` only queries levels above the context path
//! the request started with.  A failing request performs at most
//! `len(path) - 1` truncations.

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use ar_domain::{CorrelationId, DataKey};
use ar_protocol::{NotFoundReason, QueryOp, QueryResult, QueryToken, ResolutionReply};

/// Where the caller's reply goes.
pub type Requester = oneshot::Sender<ResolutionReply>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPhase {
    SearchLocal,
    CheckLeaf,
    SearchChildren,
    TryChildren(Vec<String>),
    SearchParent,
    /// Fetch the children of the current node; `left` is the one just
    /// walked up from.
    SearchSiblings { left: String },
    /// Candidates still to test at this level.
    TrySiblings(Vec<String>),
    /// The sibling at the end of the path is being tested.
    CheckSibling(Vec<String>),
    Found,
    Failed(NotFoundReason),
}

/// What the actor has to do after entering a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Query(QueryOp),
    Fail(NotFoundReason),
}

/// Result of applying a registry answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Enter(SearchPhase),
    Resolved(String),
}

/// The query a request is currently waiting on.
#[derive(Debug)]
pub struct PendingQuery {
    pub token: QueryToken,
    pub op: QueryOp,
    /// 1 for the first send, incremented per retry.
    pub attempt: u32,
    /// Timeout or retry timer currently armed for this query.
    pub timer: Option<AbortHandle>,
    /// Waiting out a back-off delay before the next attempt.
    pub backing_off: bool,
}

impl PendingQuery {
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// One in-flight resolution.  Lives from request arrival until a terminal
/// reply is sent.
#[derive(Debug)]
pub struct SearchState {
    pub correlation_id: CorrelationId,
    pub requester: Option<Requester>,
    pub key: DataKey,
    pub path: Vec<String>,
    pub phase: SearchPhase,
    pub pending: Option<PendingQuery>,
    pub hops: u32,
    pub truncations: u32,
    pub queries: u32,
    /// Length of the context path the request arrived with.
    origin_len: usize,
    /// Children lists of the levels entered by `TryChildren`, innermost last.
    descended: Vec<Vec<String>>,
    next_seq: u32,
    max_hops: u32,
}

impl SearchState {
    pub fn new(
        correlation_id: CorrelationId,
        key: DataKey,
        context_path: Vec<String>,
        max_hops: u32,
        requester: Option<Requester>,
    ) -> Self {
        Self {
            correlation_id,
            requester,
            key,
            origin_len: context_path.len(),
            path: context_path,
            phase: SearchPhase::SearchLocal,
            pending: None,
            hops: 0,
            truncations: 0,
            queries: 0,
            descended: Vec::new(),
            next_seq: 0,
            max_hops,
        }
    }

    /// First step of a fresh request.
    pub fn start(&mut self) -> Step {
        if self.path.is_empty() {
            return self.enter(SearchPhase::Failed(NotFoundReason::Exhausted));
        }
        self.enter(SearchPhase::SearchLocal)
    }

    /// Mint the token for the next outgoing query.
    pub fn next_token(&mut self) -> QueryToken {
        self.next_seq += 1;
        QueryToken {
            correlation_id: self.correlation_id,
            seq: self.next_seq,
        }
    }

    /// Enter `phase` and run local transitions until the request needs a
    /// registry answer or is finished.
    pub fn enter(&mut self, mut phase: SearchPhase) -> Step {
        loop {
            if !matches!(phase, SearchPhase::Failed(_)) {
                self.hops += 1;
                if self.hops > self.max_hops {
                    phase = SearchPhase::Failed(NotFoundReason::HopLimit {
                        hops: self.max_hops,
                    });
                }
            }
            self.phase = phase.clone();

            phase = match phase {
                SearchPhase::SearchLocal => return Step::Query(QueryOp::HasData),
                SearchPhase::CheckLeaf => return Step::Query(QueryOp::IsLeaf),
                SearchPhase::SearchChildren => return Step::Query(QueryOp::Children),
                SearchPhase::TryChildren(children) => match children.first() {
                    Some(first) => {
                        self.path.push(first.clone());
                        self.descended.push(children);
                        SearchPhase::SearchLocal
                    }
                    None => SearchPhase::SearchParent,
                },
                SearchPhase::SearchParent => self.walk_up(),
                SearchPhase::SearchSiblings { .. } => return Step::Query(QueryOp::Children),
                SearchPhase::TrySiblings(mut candidates) => {
                    if candidates.is_empty() {
                        SearchPhase::SearchParent
                    } else {
                        let next = candidates.remove(0);
                        self.path.push(next);
                        SearchPhase::CheckSibling(candidates)
                    }
                }
                SearchPhase::CheckSibling(_) => return Step::Query(QueryOp::HasData),
                SearchPhase::Found => return Step::Query(QueryOp::ResolveAddress),
                SearchPhase::Failed(reason) => return Step::Fail(reason),
            };
        }
    }

    /// Truncate one level.  A level entered by `TryChildren` already knows
    /// its siblings; a level of the original context path has to ask.
    fn walk_up(&mut self) -> SearchPhase {
        if self.path.len() <= 1 {
            return SearchPhase::Failed(NotFoundReason::Exhausted);
        }
        let from_descent = self.path.len() > self.origin_len;
        let Some(left) = self.path.pop() else {
            return SearchPhase::Failed(NotFoundReason::Exhausted);
        };
        self.truncations += 1;

        match self.descended.pop() {
            Some(children) if from_descent => SearchPhase::TrySiblings(others(children, &left)),
            _ => SearchPhase::SearchSiblings { left },
        }
    }

    /// Map a registry answer for `op` to the next phase, given the phase
    /// that issued it.
    ///
    /// Faults are handled by the actor before this is called; a shape that
    /// does not fit `op` becomes a correlation failure.
    pub fn on_answer(&mut self, op: QueryOp, result: QueryResult) -> Advance {
        match (&self.phase, op, result) {
            (SearchPhase::CheckSibling(rest), QueryOp::HasData, QueryResult::Flag { value }) => {
                if value {
                    Advance::Enter(SearchPhase::Found)
                } else {
                    let rest = rest.clone();
                    self.path.pop();
                    Advance::Enter(SearchPhase::TrySiblings(rest))
                }
            }
            (SearchPhase::SearchSiblings { left }, QueryOp::Children, QueryResult::Nodes { nodes }) => {
                Advance::Enter(SearchPhase::TrySiblings(others(nodes, left)))
            }
            (_, QueryOp::HasData, QueryResult::Flag { value: true }) => {
                Advance::Enter(SearchPhase::CheckLeaf)
            }
            (_, QueryOp::HasData, QueryResult::Flag { value: false }) => {
                Advance::Enter(SearchPhase::SearchChildren)
            }
            (_, QueryOp::IsLeaf, QueryResult::Flag { value: true }) => {
                Advance::Enter(SearchPhase::Found)
            }
            (_, QueryOp::IsLeaf, QueryResult::Flag { value: false }) => {
                Advance::Enter(SearchPhase::SearchChildren)
            }
            (_, QueryOp::Children, QueryResult::Nodes { nodes }) if nodes.is_empty() => {
                Advance::Enter(SearchPhase::SearchParent)
            }
            (_, QueryOp::Children, QueryResult::Nodes { nodes }) => {
                Advance::Enter(SearchPhase::TryChildren(nodes))
            }
            (_, QueryOp::ResolveAddress, QueryResult::Address { address }) => {
                Advance::Resolved(address)
            }
            (_, op, other) => Advance::Enter(SearchPhase::Failed(NotFoundReason::Correlation {
                detail: format!("{op:?} answered with {other:?}"),
            })),
        }
    }
}

fn others(children: Vec<String>, left: &str) -> Vec<String> {
    children.into_iter().filter(|c| c != left).collect()
}
