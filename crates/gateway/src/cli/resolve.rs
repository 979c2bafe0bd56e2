use std::sync::Arc;

use ar_domain::config::Config;
use ar_domain::{AgentId, DataKey};
use ar_resolver::{AgentRegistry, CapabilityResolver, InMemoryRegistry};

/// One-shot synchronous resolution against the configured tree.
///
/// Prints the provider id, or exits non-zero when there is none.
pub fn run(config: &Config, start: &str, key: &str) -> anyhow::Result<bool> {
    let registry = InMemoryRegistry::from_config(&config.agents)
        .map_err(|e| anyhow::anyhow!("building agent tree: {e}"))?;
    let start = AgentId::from(start);
    if registry.get_agent(&start).is_none() {
        anyhow::bail!("unknown agent \"{start}\"");
    }

    let resolver = CapabilityResolver::new(Arc::new(registry));
    match resolver.find_provider(&start, &DataKey::from(key)) {
        Some(provider) => {
            println!("{provider}");
            Ok(true)
        }
        None => {
            eprintln!("no provider for \"{key}\" reachable from \"{start}\"");
            Ok(false)
        }
    }
}
