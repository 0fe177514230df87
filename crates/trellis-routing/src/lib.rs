//! Adaptive routing inputs: what a query needs, how agents have been
//! performing, and what to do when one of them fails.

pub mod analyzer;
pub mod fallback;
pub mod performance;

pub use analyzer::{ComplexityLevel, ContextAnalysis, ContextAnalyzer, RoutingStrategy};
pub use fallback::{
    FailureAction, FailureHandling, FailureType, FallbackCondition, FallbackManager, FallbackRule,
};
pub use performance::{AgentPerformance, PerformanceMetrics, PerformanceTracker};
