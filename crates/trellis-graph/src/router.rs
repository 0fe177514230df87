//! Runtime routing out of the refiner for the conditional pattern.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use trellis_core::state::ExecutionState;
use trellis_core::types::{has_agent, push_unique, AgentKind, Edge, END};

/// Picks a destination label from the current state.
pub type RouteFn = Arc<dyn Fn(&ExecutionState) -> String + Send + Sync>;

/// A router attached to one source node.
///
/// The router returns a label; `destinations` maps each label to a node
/// name or [`END`]. Labels outside the map are a routing error at run time.
#[derive(Clone)]
pub struct ConditionalEdges {
    pub source: String,
    pub router: RouteFn,
    pub destinations: BTreeMap<String, String>,
}

impl ConditionalEdges {
    pub fn new(
        source: impl Into<String>,
        router: RouteFn,
        destinations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            source: source.into(),
            router,
            destinations,
        }
    }

    /// Run the router and map its label to a target.
    pub fn route(&self, state: &ExecutionState) -> Option<&str> {
        let label = (self.router)(state);
        self.destinations.get(&label).map(|s| s.as_str())
    }

    /// Distinct targets, in label order.
    pub fn targets(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for target in self.destinations.values() {
            if !out.contains(&target.as_str()) {
                out.push(target.as_str());
            }
        }
        out
    }
}

impl fmt::Debug for ConditionalEdges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdges")
            .field("source", &self.source)
            .field("destinations", &self.destinations)
            .finish()
    }
}

/// Which routable agents a graph was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentPresence {
    pub data_query: bool,
    pub critic: bool,
    pub historian: bool,
    pub synthesis: bool,
}

impl AgentPresence {
    pub fn of(agents: &[String]) -> Self {
        Self {
            data_query: has_agent(agents, AgentKind::DataQuery),
            critic: has_agent(agents, AgentKind::Critic),
            historian: has_agent(agents, AgentKind::Historian),
            synthesis: has_agent(agents, AgentKind::Synthesis),
        }
    }
}

/// Where to go after the refiner.
///
/// data_query when the query profile asks for it, otherwise the first
/// present of critic, historian, synthesis, otherwise END.
pub fn route_after_refiner(state: &ExecutionState, presence: AgentPresence) -> &'static str {
    if presence.data_query {
        if let Some(profile) = state.query_profile() {
            if profile.wants_data_query() {
                debug!("Routing refiner output to data_query");
                return AgentKind::DataQuery.as_str();
            }
        }
    }
    if presence.critic {
        AgentKind::Critic.as_str()
    } else if presence.historian {
        AgentKind::Historian.as_str()
    } else if presence.synthesis {
        AgentKind::Synthesis.as_str()
    } else {
        END
    }
}

/// Static edges plus the refiner router for a conditional build.
///
/// Only call when refiner is among `agents`.
pub fn conditional_routing(agents: &[String]) -> (Vec<Edge>, ConditionalEdges) {
    let presence = AgentPresence::of(agents);
    let synthesis = AgentKind::Synthesis.as_str();
    let sink = if presence.synthesis { synthesis } else { END };

    let mut edges = Vec::new();
    let mut destinations = BTreeMap::new();

    for (present, kind) in [
        (presence.data_query, AgentKind::DataQuery),
        (presence.critic, AgentKind::Critic),
        (presence.historian, AgentKind::Historian),
    ] {
        if present {
            destinations.insert(kind.as_str().to_string(), kind.as_str().to_string());
            push_unique(&mut edges, Edge::new(kind.as_str(), sink));
        }
    }
    if presence.synthesis {
        destinations.insert(synthesis.to_string(), synthesis.to_string());
        push_unique(&mut edges, Edge::to_end(synthesis));
    }
    destinations.insert(END.to_string(), END.to_string());

    let router: RouteFn =
        Arc::new(move |state: &ExecutionState| route_after_refiner(state, presence).to_string());

    (
        edges,
        ConditionalEdges::new(AgentKind::Refiner.as_str(), router, destinations),
    )
}
