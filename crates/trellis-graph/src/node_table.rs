use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::error::GraphBuildError;
use trellis_core::traits::AgentNode;
use trellis_core::types::AgentKind;

/// Agent name to node implementation.
///
/// The set of buildable agents is closed: a name that does not parse as
/// an [`AgentKind`], or has no registered node, is a build error.
#[derive(Clone, Default)]
pub struct NodeTable {
    nodes: HashMap<AgentKind, Arc<dyn AgentNode>>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under its own kind, replacing any previous one.
    pub fn register(&mut self, node: impl AgentNode) {
        self.register_arc(Arc::new(node));
    }

    pub fn register_arc(&mut self, node: Arc<dyn AgentNode>) {
        self.nodes.insert(node.kind(), node);
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentNode>> {
        self.nodes.get(&kind).cloned()
    }

    /// Look up a normalized agent name.
    pub fn resolve(&self, agent: &str) -> Result<Arc<dyn AgentNode>, GraphBuildError> {
        agent
            .parse::<AgentKind>()
            .ok()
            .and_then(|kind| self.get(kind))
            .ok_or_else(|| GraphBuildError::UnknownAgent {
                agent: agent.to_string(),
            })
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.resolve(agent).is_ok()
    }

    /// Registered kinds in canonical order.
    pub fn kinds(&self) -> Vec<AgentKind> {
        AgentKind::ALL
            .into_iter()
            .filter(|k| self.nodes.contains_key(k))
            .collect()
    }
}
