//! Graph patterns: named, reusable edge topologies over an agent list.
//!
//! A pattern is stateless with respect to any one graph build. It only
//! sees normalized agent names and answers with edges, an entry point,
//! exit points and groups of agents that may run side by side.

pub mod conditional;
pub mod enhanced;
pub mod parallel;
pub mod standard;

pub use conditional::ConditionalPattern;
pub use enhanced::EnhancedConditionalPattern;
pub use parallel::ParallelPattern;
pub use standard::StandardPattern;

use trellis_core::types::{has_agent, AgentKind, Edge};

pub const STANDARD: &str = "standard";
pub const PARALLEL: &str = "parallel";
pub const CONDITIONAL: &str = "conditional";
pub const ENHANCED_CONDITIONAL: &str = "enhanced_conditional";

/// A graph topology template.
pub trait GraphPattern: Send + Sync + 'static {
    /// Registry key, lowercase.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Directed edges for the given agents. Contains no duplicates.
    fn get_edges(&self, agents: &[String]) -> Vec<Edge>;

    /// Where execution starts, or `None` when every root starts at once.
    fn get_entry_point(&self, agents: &[String]) -> Option<String>;

    /// Agents whose completion ends the run.
    fn get_exit_points(&self, agents: &[String]) -> Vec<String>;

    /// Groups of agents that may execute concurrently.
    fn get_parallel_groups(&self, _agents: &[String]) -> Vec<Vec<String>> {
        Vec::new()
    }

    /// Whether the pattern can lay out these agents at all.
    fn validate_agents(&self, _agents: &[String]) -> bool {
        true
    }
}

/// The analysis branches in fan-out order.
pub(crate) const BRANCH_ORDER: [AgentKind; 3] =
    [AgentKind::DataQuery, AgentKind::Critic, AgentKind::Historian];

/// Branch agents present in `agents`, in fan-out order.
pub(crate) fn present_branches(agents: &[String]) -> Vec<&'static str> {
    BRANCH_ORDER
        .iter()
        .filter(|kind| has_agent(agents, **kind))
        .map(|kind| kind.as_str())
        .collect()
}

/// Distinct analysis agents (critic, historian) in list order.
pub(crate) fn analyzers(agents: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for agent in agents {
        let is_analyzer = agent
            .parse::<AgentKind>()
            .map(|k| k.is_analyzer())
            .unwrap_or(false);
        if is_analyzer && !found.contains(agent) {
            found.push(agent.clone());
        }
    }
    found
}
