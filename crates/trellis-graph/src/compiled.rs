use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use trellis_core::traits::{AgentNode, CheckpointSaver};
use trellis_core::types::Edge;

use crate::router::ConditionalEdges;

/// An executable, immutable graph.
///
/// Built by [`GraphBuilder::compile`](crate::builder::GraphBuilder::compile).
/// Shared across callers through `Arc` once cached.
pub struct CompiledGraph {
    pub(crate) id: String,
    pub(crate) pattern: String,
    pub(crate) nodes: BTreeMap<String, Arc<dyn AgentNode>>,
    pub(crate) node_order: Vec<String>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) conditional: Vec<ConditionalEdges>,
    pub(crate) entry_point: Option<String>,
    pub(crate) entry_points: Vec<String>,
    pub(crate) exit_points: Vec<String>,
    pub(crate) parallel_groups: Vec<Vec<String>>,
    pub(crate) checkpointer: Option<Arc<dyn CheckpointSaver>>,
    pub(crate) recursion_limit: usize,
}

impl CompiledGraph {
    /// Unique per compilation.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> &[String] {
        &self.node_order
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|e| e.connects(from, to))
    }

    pub fn conditional_edges(&self) -> &[ConditionalEdges] {
        &self.conditional
    }

    /// The declared entry point, if the pattern named one.
    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    /// Nodes scheduled in the first superstep.
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    pub fn exit_points(&self) -> &[String] {
        &self.exit_points
    }

    pub fn parallel_groups(&self) -> &[Vec<String>] {
        &self.parallel_groups
    }

    /// Static successors of a node, END included.
    pub fn successors(&self, node: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == node)
            .map(|e| e.to.as_str())
            .collect()
    }

    pub fn has_checkpointer(&self) -> bool {
        self.checkpointer.is_some()
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn CheckpointSaver>> {
        self.checkpointer.as_ref()
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("nodes", &self.node_order)
            .field("edges", &self.edges)
            .field("conditional", &self.conditional)
            .field("entry_points", &self.entry_points)
            .field("checkpointed", &self.has_checkpointer())
            .finish()
    }
}
