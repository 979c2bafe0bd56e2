mod agents;
mod directory;
mod observability;
mod resolver;
mod server;

pub use agents::*;
pub use directory::*;
pub use observability::*;
pub use resolver::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Capability tree, in registry order.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        // ── Resolver ────────────────────────────────────────────────
        if self.resolver.query_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "resolver.query_timeout_ms",
                "query timeout must be greater than 0",
            ));
        }
        if self.resolver.max_hops == 0 {
            errors.push(ConfigError::error(
                "resolver.max_hops",
                "max_hops must be greater than 0",
            ));
        }
        if self.resolver.mailbox_capacity == 0 {
            errors.push(ConfigError::error(
                "resolver.mailbox_capacity",
                "mailbox capacity must be greater than 0",
            ));
        }

        // ── Directory ───────────────────────────────────────────────
        if self.directory.ttl_secs == 0 {
            errors.push(ConfigError::error(
                "directory.ttl_secs",
                "ttl must be greater than 0",
            ));
        }
        if self.directory.heartbeat_secs == 0 {
            errors.push(ConfigError::error(
                "directory.heartbeat_secs",
                "heartbeat interval must be greater than 0",
            ));
        }
        if self.directory.heartbeat_secs >= self.directory.ttl_secs {
            errors.push(ConfigError::error(
                "directory.heartbeat_secs",
                format!(
                    "heartbeat interval ({}s) must be strictly less than ttl ({}s)",
                    self.directory.heartbeat_secs, self.directory.ttl_secs
                ),
            ));
        } else if self.directory.heartbeat_secs * 2 > self.directory.ttl_secs {
            errors.push(ConfigError::warning(
                "directory.heartbeat_secs",
                "heartbeat leaves less than half the ttl as margin; one late tick can evict a live session",
            ));
        }
        if self.directory.mailbox_capacity == 0 {
            errors.push(ConfigError::error(
                "directory.mailbox_capacity",
                "mailbox capacity must be greater than 0",
            ));
        }
        if self.directory.session_mailbox_capacity == 0 {
            errors.push(ConfigError::error(
                "directory.session_mailbox_capacity",
                "session mailbox capacity must be greater than 0",
            ));
        }
        if self.directory.key_prefix.is_empty() {
            errors.push(ConfigError::error(
                "directory.key_prefix",
                "key prefix must not be empty",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample rate must be within [0.0, 1.0]",
            ));
        }

        self.validate_agents(&mut errors);

        errors
    }

    fn validate_agents(&self, errors: &mut Vec<ConfigError>) {
        if self.agents.is_empty() {
            errors.push(ConfigError::warning(
                "agents",
                "no agents configured; every resolution will return not-found",
            ));
            return;
        }

        let mut parents: HashMap<&str, Option<&str>> = HashMap::new();
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("agents[{i}].id"),
                    "agent id must not be empty",
                ));
                continue;
            }
            if parents
                .insert(agent.id.as_str(), agent.parent.as_deref())
                .is_some()
            {
                errors.push(ConfigError::error(
                    format!("agents[{i}].id"),
                    format!("duplicate agent id \"{}\"", agent.id),
                ));
            }
        }

        let roots: Vec<&str> = self
            .agents
            .iter()
            .filter(|a| a.parent.is_none())
            .map(|a| a.id.as_str())
            .collect();
        if roots.len() != 1 {
            errors.push(ConfigError::error(
                "agents",
                format!("expected exactly one root agent, found {}", roots.len()),
            ));
        }

        for (i, agent) in self.agents.iter().enumerate() {
            if let Some(parent) = agent.parent.as_deref() {
                if !parents.contains_key(parent) {
                    errors.push(ConfigError::error(
                        format!("agents[{i}].parent"),
                        format!("unknown parent \"{parent}\""),
                    ));
                }
            }
        }

        // Every chain of parents must end at a root within `len` steps.
        for (i, agent) in self.agents.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut current = agent.id.as_str();
            while let Some(&Some(parent)) = parents.get(current) {
                if !seen.insert(current) {
                    errors.push(ConfigError::error(
                        format!("agents[{i}].parent"),
                        format!("agent \"{}\" is part of a parent cycle", agent.id),
                    ));
                    break;
                }
                current = parent;
            }
        }
    }
}
