use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use trellis_core::error::GraphBuildError;
use trellis_core::traits::{AgentNode, CheckpointSaver};
use trellis_core::types::{push_unique, Edge, END};

use crate::compiled::CompiledGraph;
use crate::router::ConditionalEdges;

/// Default cap on supersteps per run.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Mutable graph under construction. [`compile`](Self::compile) checks it
/// and freezes it into a [`CompiledGraph`].
pub struct GraphBuilder {
    pattern: String,
    nodes: BTreeMap<String, Arc<dyn AgentNode>>,
    node_order: Vec<String>,
    edges: Vec<Edge>,
    conditional: Vec<ConditionalEdges>,
    entry_point: Option<String>,
    exit_points: Vec<String>,
    parallel_groups: Vec<Vec<String>>,
    recursion_limit: usize,
}

impl GraphBuilder {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            nodes: BTreeMap::new(),
            node_order: Vec::new(),
            edges: Vec::new(),
            conditional: Vec::new(),
            entry_point: None,
            exit_points: Vec::new(),
            parallel_groups: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Add a node. Adding the same name twice keeps the first.
    pub fn add_node(&mut self, name: impl Into<String>, node: Arc<dyn AgentNode>) -> &mut Self {
        let name = name.into();
        if !self.nodes.contains_key(&name) {
            self.node_order.push(name.clone());
            self.nodes.insert(name, node);
        }
        self
    }

    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        push_unique(&mut self.edges, edge);
        self
    }

    pub fn add_conditional_edges(&mut self, edges: ConditionalEdges) -> &mut Self {
        self.conditional.push(edges);
        self
    }

    pub fn set_entry_point(&mut self, entry: Option<String>) -> &mut Self {
        self.entry_point = entry;
        self
    }

    pub fn set_exit_points(&mut self, exits: Vec<String>) -> &mut Self {
        self.exit_points = exits;
        self
    }

    pub fn set_parallel_groups(&mut self, groups: Vec<Vec<String>>) -> &mut Self {
        self.parallel_groups = groups;
        self
    }

    pub fn set_recursion_limit(&mut self, limit: usize) -> &mut Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    fn is_target(&self, name: &str) -> bool {
        name == END || self.nodes.contains_key(name)
    }

    /// Check structure and freeze.
    ///
    /// Every edge endpoint and router destination must be a node (or END),
    /// and every node must be reachable from an entry point. Nodes that
    /// nothing points at become additional entry points.
    pub fn compile(
        self,
        checkpointer: Option<Arc<dyn CheckpointSaver>>,
    ) -> Result<CompiledGraph, GraphBuildError> {
        if self.nodes.is_empty() {
            return Err(GraphBuildError::Compilation("graph has no nodes".to_string()));
        }

        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) {
                return Err(GraphBuildError::Compilation(format!(
                    "edge {} starts at unknown node '{}'",
                    edge, edge.from
                )));
            }
            if !self.is_target(&edge.to) {
                return Err(GraphBuildError::Compilation(format!(
                    "edge {} ends at unknown node '{}'",
                    edge, edge.to
                )));
            }
        }

        for cond in &self.conditional {
            if !self.nodes.contains_key(&cond.source) {
                return Err(GraphBuildError::Compilation(format!(
                    "conditional edges start at unknown node '{}'",
                    cond.source
                )));
            }
            if cond.destinations.is_empty() {
                return Err(GraphBuildError::Compilation(format!(
                    "conditional edges from '{}' declare no destinations",
                    cond.source
                )));
            }
            if let Some(bad) = cond.targets().into_iter().find(|t| !self.is_target(t)) {
                return Err(GraphBuildError::Compilation(format!(
                    "conditional edges from '{}' route to unknown node '{}'",
                    cond.source, bad
                )));
            }
        }

        if let Some(ref entry) = self.entry_point {
            if !self.nodes.contains_key(entry) {
                return Err(GraphBuildError::Compilation(format!(
                    "entry point '{}' is not a node",
                    entry
                )));
            }
        }

        let mut has_incoming: HashSet<&str> = self.edges.iter().map(|e| e.to.as_str()).collect();
        for cond in &self.conditional {
            has_incoming.extend(cond.targets());
        }

        let mut entry_points: Vec<String> = self.entry_point.iter().cloned().collect();
        for name in &self.node_order {
            if !has_incoming.contains(name.as_str()) && !entry_points.contains(name) {
                entry_points.push(name.clone());
            }
        }
        if entry_points.is_empty() {
            return Err(GraphBuildError::Compilation(
                "graph has no entry point".to_string(),
            ));
        }

        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = entry_points.iter().map(|s| s.as_str()).collect();
        while let Some(name) = queue.pop_front() {
            if name == END || !reached.insert(name) {
                continue;
            }
            queue.extend(self.edges.iter().filter(|e| e.from == name).map(|e| e.to.as_str()));
            for cond in self.conditional.iter().filter(|c| c.source == name) {
                queue.extend(cond.targets());
            }
        }
        if let Some(orphan) = self.node_order.iter().find(|n| !reached.contains(n.as_str())) {
            return Err(GraphBuildError::Compilation(format!(
                "node '{}' is unreachable from the entry points",
                orphan
            )));
        }

        debug!(
            pattern = %self.pattern,
            nodes = self.node_order.len(),
            edges = self.edges.len(),
            entry_points = ?entry_points,
            checkpointed = checkpointer.is_some(),
            "Compiled graph"
        );

        Ok(CompiledGraph {
            id: uuid::Uuid::new_v4().to_string(),
            pattern: self.pattern,
            nodes: self.nodes,
            node_order: self.node_order,
            edges: self.edges,
            conditional: self.conditional,
            entry_point: self.entry_point,
            entry_points,
            exit_points: self.exit_points,
            parallel_groups: self.parallel_groups,
            checkpointer,
            recursion_limit: self.recursion_limit,
        })
    }
}
