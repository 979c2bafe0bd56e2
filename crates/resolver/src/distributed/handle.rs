use tokio::sync::{mpsc, oneshot};

use ar_domain::error::{Error, Result};
use ar_domain::DataKey;
use ar_protocol::ResolutionReply;

use super::{ResolverMessage, ResolverStats, RouteDataQuery};

/// Cheap, cloneable client of the distributed resolution actor.
#[derive(Clone)]
pub struct ResolverHandle {
    tx: mpsc::Sender<ResolverMessage>,
}

impl ResolverHandle {
    pub(super) fn new(tx: mpsc::Sender<ResolverMessage>) -> Self {
        Self { tx }
    }

    /// Enqueue a request.  The reply arrives on `query.requester`.
    pub async fn route(&self, query: RouteDataQuery) -> Result<()> {
        self.tx
            .send(ResolverMessage::Route(query))
            .await
            .map_err(|_| Error::Mailbox("distributed resolver".into()))
    }

    /// Route a request and wait for its terminal reply.
    pub async fn resolve(
        &self,
        context_path: Vec<String>,
        key: impl Into<DataKey>,
    ) -> Result<ResolutionReply> {
        let (requester, reply) = oneshot::channel();
        self.route(RouteDataQuery {
            context_path,
            key: key.into(),
            requester,
        })
        .await?;
        reply
            .await
            .map_err(|_| Error::Mailbox("distributed resolver dropped the request".into()))
    }

    pub async fn stats(&self) -> Result<ResolverStats> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ResolverMessage::Stats(tx))
            .await
            .map_err(|_| Error::Mailbox("distributed resolver".into()))?;
        rx.await
            .map_err(|_| Error::Mailbox("distributed resolver".into()))
    }
}
