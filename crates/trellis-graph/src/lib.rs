//! Graph construction and execution.
//!
//! [`GraphFactory`] turns an agent list and a pattern name into a
//! [`CompiledGraph`]: it normalizes the agents, consults the cache,
//! optionally validates, lays out edges from the pattern, enforces the
//! data_query spine and compiles. Compiled graphs run with
//! [`CompiledGraph::invoke`].

pub mod builder;
pub mod cache;
pub mod checkpoint;
pub mod compiled;
pub mod executor;
pub mod factory;
pub mod node_table;
pub mod pattern;
pub mod registry;
pub mod router;

pub use builder::GraphBuilder;
pub use cache::{CacheKey, CacheStats, GraphCache, GraphStore};
pub use checkpoint::{CheckpointMemory, MemorySaver};
pub use compiled::CompiledGraph;
pub use executor::{ExecutionResult, NodeResult};
pub use factory::{GraphConfig, GraphFactory, GRAPH_FACTORY_VERSION};
pub use node_table::NodeTable;
pub use pattern::{
    ConditionalPattern, EnhancedConditionalPattern, GraphPattern, ParallelPattern, StandardPattern,
};
pub use registry::PatternRegistry;
pub use router::{ConditionalEdges, RouteFn};
