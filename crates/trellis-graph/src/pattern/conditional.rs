use trellis_core::types::Edge;

use super::standard::{fan_out_edges, fan_out_entry, fan_out_exits};
use super::{analyzers, GraphPattern, CONDITIONAL};

/// Same static layout as the standard pattern.
///
/// Callers vary the agent list per request; when refiner is present the
/// factory swaps the refiner fan-out for a runtime router.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalPattern;

impl ConditionalPattern {
    pub fn new() -> Self {
        Self
    }
}

impl GraphPattern for ConditionalPattern {
    fn name(&self) -> &str {
        CONDITIONAL
    }

    fn description(&self) -> &str {
        "Routes after refiner based on the query profile; the agent list varies per request"
    }

    fn get_edges(&self, agents: &[String]) -> Vec<Edge> {
        fan_out_edges(agents)
    }

    fn get_entry_point(&self, agents: &[String]) -> Option<String> {
        fan_out_entry(agents)
    }

    fn get_exit_points(&self, agents: &[String]) -> Vec<String> {
        fan_out_exits(agents)
    }

    /// The analysis agents the router chooses between.
    fn get_parallel_groups(&self, agents: &[String]) -> Vec<Vec<String>> {
        let group = analyzers(agents);
        if group.len() > 1 {
            vec![group]
        } else {
            Vec::new()
        }
    }
}
