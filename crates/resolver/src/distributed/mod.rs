//! Message-driven resolver for when every registry predicate is a round
//! trip.
//!
//! One actor owns every in-flight [`state::SearchState`].  It never waits
//! on the registry: each query goes out with a [`QueryToken`] and the actor
//! goes back to its mailbox.  Replies, timeouts and retry timers all come
//! back as [`ResolverMessage`]s and are dispatched by token.

mod actor;
mod handle;
pub mod state;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use ar_domain::error::{Error, Result};
use ar_domain::DataKey;
use ar_protocol::{QueryToken, RegistryResponse};

pub use actor::spawn_resolver;
pub use handle::ResolverHandle;
pub use state::Requester;

/// Ask the resolver to locate a data source.  The terminal reply is sent
/// exactly once on `requester`.
#[derive(Debug)]
pub struct RouteDataQuery {
    pub context_path: Vec<String>,
    pub key: DataKey,
    pub requester: Requester,
}

/// Everything the resolution actor reacts to.
#[derive(Debug)]
pub enum ResolverMessage {
    Route(RouteDataQuery),
    Registry(RegistryResponse),
    /// The query with this token was not answered in time.
    QueryTimedOut(QueryToken),
    /// Back-off for the query with this token has elapsed.
    RetryDue(QueryToken),
    Stats(oneshot::Sender<ResolverStats>),
}

/// Counters exposed by `GET /v1/resolver/stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolverStats {
    pub in_flight: usize,
    pub started: u64,
    pub found: u64,
    pub not_found: u64,
    /// Replies whose correlation id matched no live request.
    pub unmatched_replies: u64,
    /// Replies to an attempt that had already been superseded by a retry.
    pub stale_replies: u64,
}

/// Return address the registry uses to answer a query.
#[derive(Clone)]
pub struct ReplyTo(mpsc::Sender<ResolverMessage>);

impl ReplyTo {
    pub(crate) fn new(tx: mpsc::Sender<ResolverMessage>) -> Self {
        Self(tx)
    }

    pub async fn send(&self, response: RegistryResponse) -> Result<()> {
        self.0
            .send(ResolverMessage::Registry(response))
            .await
            .map_err(|_| Error::Mailbox("distributed resolver".into()))
    }
}

impl std::fmt::Debug for ReplyTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyTo").finish_non_exhaustive()
    }
}
