use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ar_domain::config::Config;
use ar_resolver::{CapabilityResolver, InMemoryRegistry, ResolverHandle};
use ar_sessions::{DirectoryHandle, SessionAddressBook};

use crate::inbox::InboxHandler;

/// Shared application state passed to all API handlers.
///
/// Actors are reached only through their handles; everything else is
/// read-only or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub shutdown: CancellationToken,

    // ── Resolution ────────────────────────────────────────────────────
    pub registry: Arc<InMemoryRegistry>,
    pub capabilities: Arc<CapabilityResolver>,
    pub resolver: ResolverHandle,

    // ── Sessions ──────────────────────────────────────────────────────
    pub directory: DirectoryHandle,
    pub address_book: Arc<SessionAddressBook>,
    pub inbox: Arc<InboxHandler>,
}
