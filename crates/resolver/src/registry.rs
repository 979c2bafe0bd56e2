//! Read model of the agent tree.
//!
//! The tree is owned by an external registry; the resolvers only read it
//! through [`AgentRegistry`].  [`InMemoryRegistry`] is the in-process
//! implementation used by the gateway (loaded from `[[agents]]`) and by
//! tests.

use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::RwLock;
use serde::Serialize;

use ar_domain::config::AgentConfig;
use ar_domain::error::{Error, Result};
use ar_domain::{AgentId, DataKey};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry read API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An agent as the registry describes it.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    capabilities: BTreeSet<String>,
    pub address: String,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<AgentId>) -> Self {
        let id = id.into();
        let address = format!("agent://{id}");
        Self {
            id,
            capabilities: BTreeSet::new(),
            address,
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn declared_capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Whether this agent itself declares `key` (descendants not considered).
    pub fn declares(&self, key: &DataKey) -> bool {
        self.capabilities.contains(key.as_str())
    }
}

/// Read-only view of the capability tree.
///
/// Implementations must present an acyclic tree with a single root where
/// every non-root node has exactly one parent.  `get_children` returns
/// children in registry order; the resolvers' tie-breaking depends on it.
pub trait AgentRegistry: Send + Sync {
    fn get_agent(&self, id: &AgentId) -> Option<AgentDescriptor>;
    fn get_parent(&self, id: &AgentId) -> Option<AgentId>;
    fn get_children(&self, id: &AgentId) -> Vec<AgentId>;
}

/// Walk `path` from its first element down through parent→child links and
/// return the node it names.  `None` when the path is empty or breaks.
pub fn resolve_path(registry: &dyn AgentRegistry, path: &[String]) -> Option<AgentId> {
    let (first, rest) = path.split_first()?;
    let mut current = AgentId::new(first.as_str());
    registry.get_agent(&current)?;
    for name in rest {
        let next = AgentId::new(name.as_str());
        if !registry.get_children(&current).contains(&next) {
            return None;
        }
        current = next;
    }
    Some(current)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory tree
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TreeNode {
    descriptor: AgentDescriptor,
    parent: Option<AgentId>,
    children: Vec<AgentId>,
}

/// Summary row returned by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub parent: Option<AgentId>,
    pub children: Vec<AgentId>,
    pub capabilities: BTreeSet<String>,
    pub address: String,
    pub depth: usize,
}

#[derive(Default)]
struct Tree {
    root: Option<AgentId>,
    nodes: HashMap<AgentId, TreeNode>,
}

/// Thread-safe in-memory agent tree.
///
/// Nodes can only be attached under an existing parent and ids are unique,
/// so the tree invariants hold by construction.
pub struct InMemoryRegistry {
    tree: RwLock<Tree>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::default()),
        }
    }

    /// Install the root.  Fails if a root already exists.
    pub fn insert_root(&self, descriptor: AgentDescriptor) -> Result<()> {
        let mut tree = self.tree.write();
        if let Some(root) = &tree.root {
            return Err(Error::InvalidTree(format!(
                "cannot add root \"{}\": tree already rooted at \"{root}\"",
                descriptor.id
            )));
        }
        let id = descriptor.id.clone();
        tree.root = Some(id.clone());
        tree.nodes.insert(
            id,
            TreeNode {
                descriptor,
                parent: None,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Attach `descriptor` as the last child of `parent`.
    pub fn insert_child(&self, parent: &AgentId, descriptor: AgentDescriptor) -> Result<()> {
        let mut tree = self.tree.write();
        if tree.nodes.contains_key(&descriptor.id) {
            return Err(Error::InvalidTree(format!(
                "duplicate agent id \"{}\"",
                descriptor.id
            )));
        }
        let id = descriptor.id.clone();
        match tree.nodes.get_mut(parent) {
            Some(node) => node.children.push(id.clone()),
            None => {
                return Err(Error::InvalidTree(format!(
                    "unknown parent \"{parent}\" for agent \"{id}\""
                )))
            }
        }
        tree.nodes.insert(
            id,
            TreeNode {
                descriptor,
                parent: Some(parent.clone()),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Build the tree from `[[agents]]`.  Siblings keep declaration order
    /// regardless of where their parent appears in the file.
    pub fn from_config(agents: &[AgentConfig]) -> Result<Self> {
        let registry = Self::new();
        let mut roots = agents.iter().filter(|a| a.parent.is_none());
        let root = roots
            .next()
            .ok_or_else(|| Error::InvalidTree("no root agent declared".into()))?;
        if let Some(extra) = roots.next() {
            return Err(Error::InvalidTree(format!(
                "second root agent \"{}\"",
                extra.id
            )));
        }

        registry.insert_root(descriptor_from(root))?;
        let mut queue = VecDeque::from([root.id.as_str()]);
        while let Some(parent) = queue.pop_front() {
            let parent_id = AgentId::new(parent);
            for child in agents
                .iter()
                .filter(|a| a.parent.as_deref() == Some(parent))
            {
                registry.insert_child(&parent_id, descriptor_from(child))?;
                queue.push_back(child.id.as_str());
            }
        }

        let attached = registry.len();
        if attached != agents.len() {
            return Err(Error::InvalidTree(format!(
                "{} agent(s) not reachable from root \"{}\"",
                agents.len() - attached,
                root.id
            )));
        }

        tracing::info!(agents = attached, root = %root.id, "agent tree loaded");
        Ok(registry)
    }

    /// Add a capability to an existing agent's declared set.
    pub fn declare(&self, id: &AgentId, key: impl Into<String>) -> Result<()> {
        let mut tree = self.tree.write();
        let node = tree
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("agent \"{id}\"")))?;
        node.descriptor.capabilities.insert(key.into());
        Ok(())
    }

    pub fn root(&self) -> Option<AgentId> {
        self.tree.read().root.clone()
    }

    pub fn len(&self) -> usize {
        self.tree.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().nodes.is_empty()
    }

    /// All agents in pre-order from the root.
    pub fn list(&self) -> Vec<AgentInfo> {
        let tree = self.tree.read();
        let mut out = Vec::with_capacity(tree.nodes.len());
        let Some(root) = tree.root.clone() else {
            return out;
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = tree.nodes.get(&id) else {
                continue;
            };
            for child in node.children.iter().rev() {
                stack.push((child.clone(), depth + 1));
            }
            out.push(AgentInfo {
                id,
                parent: node.parent.clone(),
                children: node.children.clone(),
                capabilities: node.descriptor.capabilities.clone(),
                address: node.descriptor.address.clone(),
                depth,
            });
        }
        out
    }
}

fn descriptor_from(agent: &AgentConfig) -> AgentDescriptor {
    AgentDescriptor::new(agent.id.as_str())
        .with_capabilities(agent.capabilities.iter().cloned())
        .with_address(agent.resolved_address())
}

impl AgentRegistry for InMemoryRegistry {
    fn get_agent(&self, id: &AgentId) -> Option<AgentDescriptor> {
        self.tree.read().nodes.get(id).map(|n| n.descriptor.clone())
    }

    fn get_parent(&self, id: &AgentId) -> Option<AgentId> {
        self.tree.read().nodes.get(id).and_then(|n| n.parent.clone())
    }

    fn get_children(&self, id: &AgentId) -> Vec<AgentId> {
        self.tree
            .read()
            .nodes
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, parent: Option<&str>, caps: &[&str]) -> AgentConfig {
        AgentConfig {
            id: id.into(),
            parent: parent.map(Into::into),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            address: None,
        }
    }

    #[test]
    fn from_config_keeps_sibling_order_when_children_precede_parent() {
        let reg = InMemoryRegistry::from_config(&[
            agent("D", Some("B"), &["x"]),
            agent("C", Some("A"), &[]),
            agent("A", None, &[]),
            agent("B", Some("A"), &[]),
        ])
        .unwrap();
        assert_eq!(reg.root(), Some(AgentId::from("A")));
        assert_eq!(
            reg.get_children(&"A".into()),
            vec![AgentId::from("C"), AgentId::from("B")]
        );
        assert_eq!(reg.get_parent(&"D".into()), Some(AgentId::from("B")));
    }

    #[test]
    fn from_config_rejects_orphans_and_second_roots() {
        let orphan = InMemoryRegistry::from_config(&[
            agent("A", None, &[]),
            agent("X", Some("missing"), &[]),
        ]);
        assert!(matches!(orphan, Err(Error::InvalidTree(_))));

        let two_roots =
            InMemoryRegistry::from_config(&[agent("A", None, &[]), agent("Z", None, &[])]);
        assert!(matches!(two_roots, Err(Error::InvalidTree(_))));
    }

    #[test]
    fn insert_rejects_duplicates_and_unknown_parents() {
        let reg = InMemoryRegistry::new();
        reg.insert_root(AgentDescriptor::new("A")).unwrap();
        reg.insert_child(&"A".into(), AgentDescriptor::new("B")).unwrap();
        assert!(reg.insert_child(&"A".into(), AgentDescriptor::new("B")).is_err());
        assert!(reg.insert_child(&"Q".into(), AgentDescriptor::new("C")).is_err());
        assert!(reg.insert_root(AgentDescriptor::new("R")).is_err());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn list_is_pre_order_with_depth() {
        let reg = InMemoryRegistry::from_config(&[
            agent("A", None, &[]),
            agent("B", Some("A"), &[]),
            agent("C", Some("A"), &[]),
            agent("D", Some("B"), &["x"]),
        ])
        .unwrap();
        let rows: Vec<(String, usize)> = reg
            .list()
            .into_iter()
            .map(|r| (r.id.to_string(), r.depth))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("A".to_string(), 0),
                ("B".to_string(), 1),
                ("D".to_string(), 2),
                ("C".to_string(), 1)
            ]
        );
    }

    #[test]
    fn resolve_path_follows_parent_child_links() {
        let reg = InMemoryRegistry::from_config(&[
            agent("A", None, &[]),
            agent("B", Some("A"), &[]),
            agent("D", Some("B"), &[]),
        ])
        .unwrap();
        let path = |p: &[&str]| p.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(resolve_path(&reg, &path(&["A", "B", "D"])), Some("D".into()));
        assert_eq!(resolve_path(&reg, &path(&["B", "D"])), Some("D".into()));
        assert_eq!(resolve_path(&reg, &path(&["A", "D"])), None);
        assert_eq!(resolve_path(&reg, &[]), None);
    }

    #[test]
    fn declare_extends_capabilities() {
        let reg = InMemoryRegistry::new();
        reg.insert_root(AgentDescriptor::new("A")).unwrap();
        reg.declare(&"A".into(), "x").unwrap();
        let a = reg.get_agent(&"A".into()).unwrap();
        assert!(a.declares(&DataKey::from("x")));
        assert!(reg.declare(&"nope".into(), "x").is_err());
    }
}
