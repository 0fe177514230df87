use trellis_core::types::{has_agent, push_unique, AgentKind, Edge, END};

use super::{present_branches, GraphPattern, STANDARD};

/// Refiner fans out to the analysis branches, which join at synthesis.
///
/// ```text
/// refiner ──┬─> data_query ─┐
///           ├─> critic ─────┼─> synthesis ─> END
///           └─> historian ──┘
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPattern;

impl StandardPattern {
    pub fn new() -> Self {
        Self
    }
}

impl GraphPattern for StandardPattern {
    fn name(&self) -> &str {
        STANDARD
    }

    fn description(&self) -> &str {
        "Refiner fans out to data_query, critic and historian, which join at synthesis"
    }

    fn get_edges(&self, agents: &[String]) -> Vec<Edge> {
        fan_out_edges(agents)
    }

    /// Refiner when present. Otherwise the first agent with no incoming edge
    /// rather than the literal first agent, so `["synthesis", "critic"]` enters
    /// at critic and every agent stays reachable.
    fn get_entry_point(&self, agents: &[String]) -> Option<String> {
        fan_out_entry(agents)
    }

    fn get_exit_points(&self, agents: &[String]) -> Vec<String> {
        fan_out_exits(agents)
    }
}

/// Edges of the fan-out / join layout shared by the sequential patterns.
pub(crate) fn fan_out_edges(agents: &[String]) -> Vec<Edge> {
    let refiner = AgentKind::Refiner.as_str();
    let synthesis = AgentKind::Synthesis.as_str();
    let has_refiner = has_agent(agents, AgentKind::Refiner);
    let has_synthesis = has_agent(agents, AgentKind::Synthesis);
    let branches = present_branches(agents);

    let mut edges = Vec::new();

    // Where the branches (or refiner, with no branches) lead.
    let sink = if has_synthesis { synthesis } else { END };

    if has_refiner {
        if branches.is_empty() {
            push_unique(&mut edges, Edge::new(refiner, sink));
        }
        for branch in &branches {
            push_unique(&mut edges, Edge::new(refiner, *branch));
        }
    }
    for branch in &branches {
        push_unique(&mut edges, Edge::new(*branch, sink));
    }
    if has_synthesis {
        push_unique(&mut edges, Edge::to_end(synthesis));
    }

    edges
}

/// Refiner when present, else the first agent nothing points at.
pub(crate) fn fan_out_entry(agents: &[String]) -> Option<String> {
    if has_agent(agents, AgentKind::Refiner) {
        return Some(AgentKind::Refiner.as_str().to_string());
    }
    let edges = fan_out_edges(agents);
    agents
        .iter()
        .find(|agent| !edges.iter().any(|e| e.to == **agent))
        .or_else(|| agents.first())
        .cloned()
}

/// Synthesis, else the analysis branches, else refiner.
pub(crate) fn fan_out_exits(agents: &[String]) -> Vec<String> {
    if has_agent(agents, AgentKind::Synthesis) {
        return vec![AgentKind::Synthesis.as_str().to_string()];
    }
    let branches = present_branches(agents);
    if !branches.is_empty() {
        return branches.into_iter().map(String::from).collect();
    }
    if has_agent(agents, AgentKind::Refiner) {
        return vec![AgentKind::Refiner.as_str().to_string()];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(agents: &[&str]) -> Vec<String> {
        agents.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_full_fan_out() {
        let agents = names(&["refiner", "critic", "historian", "synthesis"]);
        let edges = StandardPattern.get_edges(&agents);
        assert_eq!(
            edges,
            vec![
                Edge::new("refiner", "critic"),
                Edge::new("refiner", "historian"),
                Edge::new("critic", "synthesis"),
                Edge::new("historian", "synthesis"),
                Edge::to_end("synthesis"),
            ]
        );
        assert_eq!(StandardPattern.get_entry_point(&agents).as_deref(), Some("refiner"));
        assert_eq!(StandardPattern.get_exit_points(&agents), names(&["synthesis"]));
    }

    #[test]
    fn test_refiner_only_ends() {
        let agents = names(&["refiner"]);
        assert_eq!(StandardPattern.get_edges(&agents), vec![Edge::to_end("refiner")]);
        assert_eq!(StandardPattern.get_exit_points(&agents), names(&["refiner"]));
    }

    #[test]
    fn test_refiner_straight_to_synthesis() {
        let agents = names(&["refiner", "synthesis"]);
        assert_eq!(
            StandardPattern.get_edges(&agents),
            vec![Edge::new("refiner", "synthesis"), Edge::to_end("synthesis")]
        );
    }

    #[test]
    fn test_branches_without_synthesis_end() {
        let agents = names(&["refiner", "historian", "critic"]);
        let edges = StandardPattern.get_edges(&agents);
        assert!(edges.contains(&Edge::new("critic", END)));
        assert!(edges.contains(&Edge::new("historian", END)));
        assert_eq!(StandardPattern.get_exit_points(&agents), names(&["critic", "historian"]));
    }

    #[test]
    fn test_entry_without_refiner_is_a_root() {
        let agents = names(&["synthesis", "critic"]);
        assert_eq!(StandardPattern.get_entry_point(&agents).as_deref(), Some("critic"));

        let agents = names(&["synthesis"]);
        assert_eq!(StandardPattern.get_entry_point(&agents).as_deref(), Some("synthesis"));
        assert_eq!(StandardPattern.get_edges(&agents), vec![Edge::to_end("synthesis")]);
    }

    #[test]
    fn test_duplicates_do_not_duplicate_edges() {
        let agents = names(&["refiner", "critic", "critic", "synthesis"]);
        let edges = StandardPattern.get_edges(&agents);
        let mut deduped = edges.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(edges.len(), deduped.len());
    }

    #[test]
    fn test_empty_agents() {
        assert!(StandardPattern.get_edges(&[]).is_empty());
        assert!(StandardPattern.get_entry_point(&[]).is_none());
        assert!(StandardPattern.get_exit_points(&[]).is_empty());
    }
}
