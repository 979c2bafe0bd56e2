use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent tree
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One node of the capability tree, as declared in `[[agents]]`.
///
/// Declaration order matters: siblings are scanned in the order they
/// appear in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    /// Parent agent id.  Exactly one agent (the root) omits it.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Concrete address handed to callers when this agent is resolved.
    /// Defaults to `agent://<id>`.
    #[serde(default)]
    pub address: Option<String>,
}

impl AgentConfig {
    pub fn resolved_address(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| format!("agent://{}", self.id))
    }
}
