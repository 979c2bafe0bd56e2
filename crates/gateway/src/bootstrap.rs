//! AppState construction and background-task spawning extracted from
//! `main.rs`, so tests can boot the full stack without a listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use ar_domain::config::{Config, ConfigSeverity};
use ar_resolver::{spawn_registry, spawn_resolver, AgentRegistry, CapabilityResolver, InMemoryRegistry};
use ar_sessions::{spawn_directory, InMemoryTtlStore, SessionAddressBook, TtlStore};

use crate::inbox::InboxHandler;
use crate::state::AppState;

/// Interval of the periodic stats log line.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Validate config, build the agent tree, start every actor and return a
/// fully-wired [`AppState`].  All actors stop when `shutdown` is cancelled.
pub async fn build_app_state(
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── Agent tree ───────────────────────────────────────────────────
    let registry = if config.agents.is_empty() {
        Arc::new(InMemoryRegistry::new())
    } else {
        Arc::new(InMemoryRegistry::from_config(&config.agents).context("building agent tree")?)
    };
    let capabilities = Arc::new(CapabilityResolver::new(
        registry.clone() as Arc<dyn AgentRegistry>
    ));

    // ── Distributed resolution ───────────────────────────────────────
    let (registry_mailbox, _) = spawn_registry(
        registry.clone(),
        config.resolver.mailbox_capacity,
        shutdown.clone(),
    );
    let (resolver, _) = spawn_resolver(&config.resolver, registry_mailbox, shutdown.clone());

    // ── Session directory ────────────────────────────────────────────
    let store: Arc<dyn TtlStore> = Arc::new(InMemoryTtlStore::new());
    let address_book = Arc::new(SessionAddressBook::new());
    let inbox = Arc::new(InboxHandler::default());
    let (directory, _) = spawn_directory(
        &config.directory,
        store,
        address_book.clone(),
        inbox.clone(),
        shutdown.clone(),
    )
    .context("starting session directory")?;

    tracing::info!(
        agents = registry.len(),
        ttl_secs = config.directory.ttl_secs,
        heartbeat_secs = config.directory.heartbeat_secs,
        "app state ready"
    );

    Ok(AppState {
        config,
        shutdown,
        registry,
        capabilities,
        resolver,
        directory,
        address_book,
        inbox,
    })
}

/// Spawn periodic maintenance loops.
pub fn spawn_background_tasks(state: &AppState) {
    let resolver = state.resolver.clone();
    let address_book = state.address_book.clone();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match resolver.stats().await {
                Ok(stats) => tracing::info!(
                    in_flight = stats.in_flight,
                    started = stats.started,
                    found = stats.found,
                    not_found = stats.not_found,
                    unmatched_replies = stats.unmatched_replies,
                    live_sessions = address_book.len(),
                    "stats"
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "resolver stats unavailable");
                    break;
                }
            }
        }
    });
}
