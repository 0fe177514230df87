//! Trellis: dynamic multi-agent workflow graphs.
//!
//! ```no_run
//! use trellis::prelude::*;
//!
//! # async fn run(nodes: NodeTable) -> trellis::Result<()> {
//! let factory = GraphFactory::new(nodes);
//! let graph = factory.create_graph(
//!     &GraphConfig::new(["refiner", "critic", "synthesis"]).with_pattern("conditional"),
//! )?;
//! let result = graph
//!     .invoke(ExecutionState::with_query("Compare the two proposals"), None)
//!     .await?;
//! println!("{:?}", result.state.get("synthesis"));
//! # Ok(())
//! # }
//! ```

pub use trellis_core;
pub use trellis_graph;
pub use trellis_routing;
pub use trellis_validation;

pub use trellis_core::{GraphBuildError, Result, TrellisConfig, TrellisError, ValidationError};

use std::path::Path;

/// Load configuration and build a factory over `nodes`.
pub fn factory_from_path(
    nodes: trellis_graph::NodeTable,
    path: &Path,
) -> Result<trellis_graph::GraphFactory> {
    let config = TrellisConfig::load(path)?;
    tracing::info!(path = %path.display(), "Loaded trellis config");
    trellis_graph::GraphFactory::from_config(nodes, &config)
}

pub mod prelude {
    pub use trellis_core::traits::{AgentNode, CheckpointSaver, MemoryManager};
    pub use trellis_core::{AgentKind, ExecutionState, QueryProfile, END};
    pub use trellis_graph::{
        CheckpointMemory, CompiledGraph, ExecutionResult, GraphConfig, GraphFactory, GraphPattern,
        MemorySaver, NodeTable, PatternRegistry,
    };
    pub use trellis_routing::{FailureType, PerformanceMetrics, RoutingStrategy};
    pub use trellis_validation::{DomainWorkflowValidator, ValidationContext, WorkflowValidator};
}
