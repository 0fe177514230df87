use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sentinel target for terminal edges.
pub const END: &str = "END";

/// Agents that run before graph execution and never become graph nodes.
pub const PRE_STEP_AGENTS: &[&str] = &["classifier"];

/// The fixed vocabulary of agents that can become graph vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Refiner,
    DataQuery,
    Critic,
    Historian,
    Synthesis,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Refiner,
        AgentKind::DataQuery,
        AgentKind::Critic,
        AgentKind::Historian,
        AgentKind::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Refiner => "refiner",
            AgentKind::DataQuery => "data_query",
            AgentKind::Critic => "critic",
            AgentKind::Historian => "historian",
            AgentKind::Synthesis => "synthesis",
        }
    }

    /// Analysis agents sit between the refiner and synthesis.
    pub fn is_analyzer(&self) -> bool {
        matches!(self, AgentKind::Critic | AgentKind::Historian)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "refiner" => Ok(AgentKind::Refiner),
            "data_query" => Ok(AgentKind::DataQuery),
            "critic" => Ok(AgentKind::Critic),
            "historian" => Ok(AgentKind::Historian),
            "synthesis" => Ok(AgentKind::Synthesis),
            other => Err(format!("unknown agent: {}", other)),
        }
    }
}

/// Lower-case agent names and drop pre-step agents.
///
/// Duplicates are kept; the validators flag them.
pub fn normalize_agents<S: AsRef<str>>(agents: &[S]) -> Vec<String> {
    agents
        .iter()
        .map(|a| a.as_ref().trim().to_lowercase())
        .filter(|a| !a.is_empty() && !PRE_STEP_AGENTS.contains(&a.as_str()))
        .collect()
}

/// Whether `agents` contains the given kind.
pub fn has_agent<S: AsRef<str>>(agents: &[S], kind: AgentKind) -> bool {
    agents.iter().any(|a| a.as_ref() == kind.as_str())
}

/// A directed edge between two graph nodes. `to` may be [`END`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Edge into the terminal sentinel.
    pub fn to_end(from: impl Into<String>) -> Self {
        Self::new(from, END)
    }

    pub fn is_terminal(&self) -> bool {
        self.to == END
    }

    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.from == from && self.to == to
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Push an edge unless an identical one is already present.
pub fn push_unique(edges: &mut Vec<Edge>, edge: Edge) -> bool {
    if edges.contains(&edge) {
        return false;
    }
    edges.push(edge);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_round_trip_names() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.as_str().parse::<AgentKind>(), Ok(kind));
        }
        assert_eq!("  Data_Query ".parse::<AgentKind>(), Ok(AgentKind::DataQuery));
        assert!("classifier".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_normalize_lowercases_and_strips_pre_step() {
        let agents = vec!["Refiner", "CLASSIFIER", "Critic", "critic", " "];
        let normalized = normalize_agents(&agents);
        assert_eq!(normalized, vec!["refiner", "critic", "critic"]);
    }

    #[test]
    fn test_push_unique() {
        let mut edges = vec![Edge::new("refiner", "critic")];
        assert!(!push_unique(&mut edges, Edge::new("refiner", "critic")));
        assert!(push_unique(&mut edges, Edge::to_end("critic")));
        assert_eq!(edges.len(), 2);
        assert!(edges[1].is_terminal());
    }

    #[test]
    fn test_edge_display() {
        assert_eq!(Edge::to_end("synthesis").to_string(), "synthesis -> END");
    }
}
