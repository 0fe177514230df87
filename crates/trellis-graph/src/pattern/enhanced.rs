//! Context-aware conditional pattern.
//!
//! Picks an agent subset per query from the query's complexity analysis
//! and recent agent performance, and answers "what now" when an agent
//! fails. Static edges are the standard fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use trellis_core::config::TrellisConfig;
use trellis_core::error::Result;
use trellis_core::types::{AgentKind, Edge};
use trellis_routing::{
    ComplexityLevel, ContextAnalysis, ContextAnalyzer, FailureHandling, FailureType,
    FallbackManager, PerformanceMetrics, PerformanceTracker, RoutingStrategy,
};
use trellis_validation::ValidationContext;

use crate::executor::ExecutionResult;

use super::standard::{fan_out_edges, fan_out_entry, fan_out_exits};
use super::{analyzers, GraphPattern, ENHANCED_CONDITIONAL};

/// How long a recommendation stays valid unless configured otherwise.
pub const DEFAULT_RECOMMENDATION_TTL: Duration = Duration::from_secs(300);

/// Agents scoring above this are eligible under performance-optimized routing.
pub const PERFORMANCE_THRESHOLD: f64 = 0.6;

/// Extra agents added under performance-optimized routing.
const TOP_PERFORMERS: usize = 2;

/// Characters of the query used in the recommendation key.
const KEY_QUERY_CHARS: usize = 100;

const MAX_RECOMMENDATIONS: usize = 256;

struct Recommendation {
    created_at: Instant,
    agents: Vec<String>,
}

pub struct EnhancedConditionalPattern {
    analyzer: ContextAnalyzer,
    performance: Arc<dyn PerformanceMetrics>,
    fallback: FallbackManager,
    recommendations: Mutex<HashMap<String, Recommendation>>,
    recommendation_ttl: Duration,
}

impl Default for EnhancedConditionalPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancedConditionalPattern {
    pub fn new() -> Self {
        Self {
            analyzer: ContextAnalyzer::new(),
            performance: Arc::new(PerformanceTracker::new()),
            fallback: FallbackManager::new(),
            recommendations: Mutex::new(HashMap::new()),
            recommendation_ttl: DEFAULT_RECOMMENDATION_TTL,
        }
    }

    /// Build from the `[routing]` and `[fallback]` config sections.
    pub fn from_config(config: &TrellisConfig) -> Result<Self> {
        let fallback =
            FallbackManager::from_settings(&config.fallback, config.routing.failure_window_secs)?;
        Ok(Self::new()
            .with_performance(Arc::new(PerformanceTracker::with_window(
                config.routing.performance_window,
            )))
            .with_fallback_manager(fallback)
            .with_recommendation_ttl(Duration::from_secs(config.routing.recommendation_ttl_secs)))
    }

    pub fn with_performance(mut self, performance: Arc<dyn PerformanceMetrics>) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_fallback_manager(mut self, fallback: FallbackManager) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_recommendation_ttl(mut self, ttl: Duration) -> Self {
        self.recommendation_ttl = ttl;
        self
    }

    pub fn performance(&self) -> &Arc<dyn PerformanceMetrics> {
        &self.performance
    }

    pub fn fallback_manager(&self) -> &FallbackManager {
        &self.fallback
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Recommendation>> {
        self.recommendations.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn analyze_context(&self, query: &str) -> ContextAnalysis {
        self.analyzer.analyze(query)
    }

    /// The subset of `available` the strategy calls for, in `available` order.
    pub fn select_agents_for_strategy(
        &self,
        strategy: RoutingStrategy,
        available: &[String],
        analysis: &ContextAnalysis,
    ) -> Vec<String> {
        let is = |agent: &str, kind: AgentKind| agent == kind.as_str();
        let core = |agent: &str| is(agent, AgentKind::Refiner) || is(agent, AgentKind::Synthesis);

        match strategy {
            RoutingStrategy::Streamlined => {
                available.iter().filter(|a| core(a.as_str())).cloned().collect()
            }
            RoutingStrategy::Comprehensive => available.to_vec(),
            RoutingStrategy::Standard => available
                .iter()
                .filter(|a| {
                    let a = a.as_str();
                    core(a)
                        || (is(a, AgentKind::Critic)
                            && (analysis.requires_criticism
                                || analysis.complexity_level >= ComplexityLevel::Moderate))
                        || (is(a, AgentKind::Historian) && analysis.requires_research)
                })
                .cloned()
                .collect(),
            RoutingStrategy::PerformanceOptimized => {
                let mut scored: Vec<(&String, f64)> = Vec::new();
                for agent in available.iter().filter(|a| !core(a.as_str())) {
                    if scored.iter().any(|(seen, _)| *seen == agent) {
                        continue;
                    }
                    let score = self.performance.performance_score(agent);
                    if score > PERFORMANCE_THRESHOLD {
                        scored.push((agent, score));
                    }
                }
                // Stable: ties keep their order in `available`.
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                let chosen: Vec<&String> =
                    scored.into_iter().take(TOP_PERFORMERS).map(|(a, _)| a).collect();
                available
                    .iter()
                    .filter(|a| core(a.as_str()) || chosen.contains(a))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Agents to run for this query, cached per (query prefix, agent set).
    pub fn get_recommended_agents(&self, query: &str, available: &[String]) -> Vec<String> {
        let key = recommendation_key(query, available);

        {
            let cache = self.cache();
            if let Some(hit) = cache.get(&key) {
                if hit.created_at.elapsed() < self.recommendation_ttl {
                    debug!(agents = ?hit.agents, "Recommendation cache hit");
                    return hit.agents.clone();
                }
            }
        }

        let analysis = self.analyze_context(query);
        let agents = self.select_agents_for_strategy(analysis.routing_strategy, available, &analysis);
        info!(
            strategy = %analysis.routing_strategy,
            complexity = analysis.complexity_score,
            agents = ?agents,
            "Recommended agents for query"
        );

        let mut cache = self.cache();
        let ttl = self.recommendation_ttl;
        cache.retain(|_, r| r.created_at.elapsed() < ttl);
        if cache.len() >= MAX_RECOMMENDATIONS {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, r)| r.created_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            key,
            Recommendation {
                created_at: Instant::now(),
                agents: agents.clone(),
            },
        );
        agents
    }

    pub fn clear_recommendations(&self) {
        self.cache().clear();
    }

    /// Record one execution outcome for performance scoring and failure rates.
    pub fn record_execution(&self, agent: &str, duration_ms: f64, success: bool) {
        self.performance.record_execution(agent, duration_ms, success);
        if success {
            self.fallback.record_success(agent);
        }
    }

    /// Feed every node outcome of a finished run into the metrics.
    pub fn record_run(&self, result: &ExecutionResult) {
        for node in &result.node_results {
            self.record_execution(&node.node, node.elapsed_ms as f64, node.succeeded);
            if !node.succeeded {
                self.fallback.record_failure(&node.node);
            }
        }
    }

    /// Validator inputs for a query: its analysis plus current performance.
    pub fn validation_context(&self, query: &str) -> ValidationContext {
        ValidationContext::new()
            .with_analysis(self.analyze_context(query))
            .with_performance(self.performance.snapshot())
    }

    /// Decide how to proceed after `failed_agent` failed.
    pub fn handle_agent_failure(
        &self,
        failed_agent: &str,
        failure: FailureType,
        remaining: Option<&[String]>,
    ) -> FailureHandling {
        self.fallback.handle_failure(failed_agent, failure, remaining)
    }
}

fn recommendation_key(query: &str, available: &[String]) -> String {
    let prefix: String = query.chars().take(KEY_QUERY_CHARS).collect();
    let mut agents: Vec<&str> = available.iter().map(|a| a.as_str()).collect();
    agents.sort_unstable();
    format!("{}|{}", prefix, agents.join(","))
}

impl GraphPattern for EnhancedConditionalPattern {
    fn name(&self) -> &str {
        ENHANCED_CONDITIONAL
    }

    fn description(&self) -> &str {
        "Conditional routing driven by query complexity, agent performance and fallback rules"
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

    fn get_parallel_groups(&self, agents: &[String]) -> Vec<Vec<String>> {
        let group = analyzers(agents);
        if group.len() > 1 {
            vec![group]
        } else {
            Vec::new()
        }
    }
}
