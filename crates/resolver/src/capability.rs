//! Synchronous capability resolver.
//!
//! Search order:
//! 1. **Downward**: pre-order DFS of the subtree rooted at `start`
//!    (`start` first, then each child in registry order, recursively).
//! 2. **Upward**: only when phase 1 finds nothing.  Walk the ancestors of
//!    `start`; at each level test the *own* declared set of every sibling
//!    of the node we came from.  Siblings' subtrees are never searched, and
//!    the ancestors themselves are never candidates.
//!
//! The first match in that scan order wins, so results are deterministic
//! for a given registry.

use std::sync::Arc;

use ar_domain::{AgentId, DataKey};

use crate::registry::AgentRegistry;

pub struct CapabilityResolver {
    registry: Arc<dyn AgentRegistry>,
}

impl CapabilityResolver {
    pub fn new(registry: Arc<dyn AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Find an agent declaring `key`, starting from `start`.
    pub fn find_provider(&self, start: &AgentId, key: &DataKey) -> Option<AgentId> {
        if self.registry.get_agent(start).is_none() {
            tracing::debug!(start = %start, key = %key, "start agent not in registry");
            return None;
        }

        if let Some(found) = self.search_down(start, key) {
            tracing::debug!(start = %start, key = %key, provider = %found, "provider found below start");
            return Some(found);
        }

        let found = self.search_up(start, key);
        match &found {
            Some(provider) => {
                tracing::debug!(start = %start, key = %key, provider = %provider, "provider found among ancestors' children")
            }
            None => tracing::debug!(start = %start, key = %key, "no provider"),
        }
        found
    }

    fn search_down(&self, start: &AgentId, key: &DataKey) -> Option<AgentId> {
        let mut stack = vec![start.clone()];
        while let Some(id) = stack.pop() {
            if let Some(agent) = self.registry.get_agent(&id) {
                if agent.declares(key) {
                    return Some(id);
                }
            }
            // Reversed so the first child is popped next.
            stack.extend(self.registry.get_children(&id).into_iter().rev());
        }
        None
    }

    fn search_up(&self, start: &AgentId, key: &DataKey) -> Option<AgentId> {
        let mut current = start.clone();
        while let Some(parent) = self.registry.get_parent(&current) {
            let sibling = self
                .registry
                .get_children(&parent)
                .into_iter()
                .filter(|child| *child != current)
                .find(|child| {
                    self.registry
                        .get_agent(child)
                        .is_some_and(|agent| agent.declares(key))
                });
            if sibling.is_some() {
                return sibling;
            }
            current = parent;
        }
        None
    }
}
