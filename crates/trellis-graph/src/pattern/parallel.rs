use trellis_core::types::{has_agent, push_unique, AgentKind, Edge};

use super::{GraphPattern, PARALLEL};

/// Every non-synthesis agent starts at once and feeds synthesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelPattern;

impl ParallelPattern {
    pub fn new() -> Self {
        Self
    }
}

fn contributors(agents: &[String]) -> Vec<String> {
    let synthesis = AgentKind::Synthesis.as_str();
    let mut out: Vec<String> = Vec::new();
    for agent in agents {
        if agent != synthesis && !out.contains(agent) {
            out.push(agent.clone());
        }
    }
    out
}

impl GraphPattern for ParallelPattern {
    fn name(&self) -> &str {
        PARALLEL
    }

    fn description(&self) -> &str {
        "All non-synthesis agents run concurrently, then synthesis combines their output"
    }

    fn get_edges(&self, agents: &[String]) -> Vec<Edge> {
        let mut edges = Vec::new();
        let contributors = contributors(agents);

        if has_agent(agents, AgentKind::Synthesis) {
            let synthesis = AgentKind::Synthesis.as_str();
            for agent in &contributors {
                push_unique(&mut edges, Edge::new(agent.as_str(), synthesis));
            }
            push_unique(&mut edges, Edge::to_end(synthesis));
        } else {
            for agent in &contributors {
                push_unique(&mut edges, Edge::to_end(agent.as_str()));
            }
        }
        edges
    }

    /// No single entry: all roots start together.
    fn get_entry_point(&self, _agents: &[String]) -> Option<String> {
        None
    }

    fn get_exit_points(&self, agents: &[String]) -> Vec<String> {
        if has_agent(agents, AgentKind::Synthesis) {
            vec![AgentKind::Synthesis.as_str().to_string()]
        } else {
            contributors(agents)
        }
    }

    fn get_parallel_groups(&self, agents: &[String]) -> Vec<Vec<String>> {
        let group = contributors(agents);
        if group.len() > 1 {
            vec![group]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(agents: &[&str]) -> Vec<String> {
        agents.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_without_synthesis_each_agent_ends() {
        let agents = names(&["critic", "historian"]);
        assert_eq!(
            ParallelPattern.get_edges(&agents),
            vec![Edge::to_end("critic"), Edge::to_end("historian")]
        );
        assert!(ParallelPattern.get_entry_point(&agents).is_none());
        assert_eq!(ParallelPattern.get_exit_points(&agents), agents);
    }

    #[test]
    fn test_join_at_synthesis() {
        let agents = names(&["refiner", "critic", "historian", "synthesis"]);
        let edges = ParallelPattern.get_edges(&agents);
        assert_eq!(edges.len(), 4);
        assert!(edges.contains(&Edge::new("refiner", "synthesis")));
        assert!(edges.contains(&Edge::to_end("synthesis")));
        assert_eq!(
            ParallelPattern.get_parallel_groups(&agents),
            vec![names(&["refiner", "critic", "historian"])]
        );
    }

    #[test]
    fn test_single_contributor_has_no_group() {
        let agents = names(&["critic", "synthesis"]);
        assert!(ParallelPattern.get_parallel_groups(&agents).is_empty());
    }
}
