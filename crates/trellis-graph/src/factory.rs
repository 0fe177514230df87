use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use trellis_core::config::TrellisConfig;
use trellis_core::error::{GraphBuildError, Result, ValidationError};
use trellis_core::traits::{CheckpointSaver, MemoryManager};
use trellis_core::types::{has_agent, normalize_agents, push_unique, AgentKind, Edge};
use trellis_core::validation::ValidationResult;
use trellis_validation::{DomainWorkflowValidator, ValidationContext, WorkflowValidator};

use crate::builder::{GraphBuilder, DEFAULT_RECURSION_LIMIT};
use crate::cache::{CacheKey, CacheStats, GraphCache, GraphStore};
use crate::compiled::CompiledGraph;
use crate::node_table::NodeTable;
use crate::pattern::{EnhancedConditionalPattern, CONDITIONAL, PARALLEL, STANDARD};
use crate::registry::PatternRegistry;
use crate::router::conditional_routing;

/// Part of every cache key. Bump when edge or invariant logic changes so
/// graphs built by older logic are never served.
pub const GRAPH_FACTORY_VERSION: &str = "2";

/// Everything that determines one graph build.
#[derive(Clone)]
pub struct GraphConfig {
    pub agents: Vec<String>,
    pub pattern_name: String,
    pub enable_checkpoints: bool,
    pub memory_manager: Option<Arc<dyn MemoryManager>>,
    pub cache_enabled: bool,
    pub enable_validation: bool,
    /// Replaces the factory's default validator for this build.
    pub validator: Option<Arc<dyn WorkflowValidator>>,
    pub validator_strict_mode: bool,
    /// Extra inputs for the validator (routing bounds, analysis, performance).
    pub validation_context: Option<ValidationContext>,
}

impl GraphConfig {
    /// Standard pattern, cached, no validation, no checkpoints.
    pub fn new<S: Into<String>>(agents: impl IntoIterator<Item = S>) -> Self {
        Self {
            agents: agents.into_iter().map(Into::into).collect(),
            pattern_name: STANDARD.to_string(),
            enable_checkpoints: false,
            memory_manager: None,
            cache_enabled: true,
            enable_validation: false,
            validator: None,
            validator_strict_mode: false,
            validation_context: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern_name = pattern.into();
        self
    }

    /// Request checkpointing through the given memory manager.
    pub fn with_checkpoints(mut self, memory_manager: Arc<dyn MemoryManager>) -> Self {
        self.enable_checkpoints = true;
        self.memory_manager = Some(memory_manager);
        self
    }

    pub fn checkpoints(mut self, enabled: bool) -> Self {
        self.enable_checkpoints = enabled;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn WorkflowValidator>) -> Self {
        self.enable_validation = true;
        self.validator = Some(validator);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.validator_strict_mode = strict;
        self
    }

    pub fn with_validation_context(mut self, context: ValidationContext) -> Self {
        self.validation_context = Some(context);
        self
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("agents", &self.agents)
            .field("pattern_name", &self.pattern_name)
            .field("enable_checkpoints", &self.enable_checkpoints)
            .field("has_memory_manager", &self.memory_manager.is_some())
            .field("cache_enabled", &self.cache_enabled)
            .field("enable_validation", &self.enable_validation)
            .field("validator", &self.validator.as_ref().map(|v| v.name().to_string()))
            .field("validator_strict_mode", &self.validator_strict_mode)
            .finish()
    }
}

/// Defaults applied by [`GraphFactory::graph_config`].
#[derive(Debug, Clone)]
struct BuildDefaults {
    pattern: String,
    cache_enabled: bool,
    validation: bool,
    strict: bool,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            pattern: STANDARD.to_string(),
            cache_enabled: true,
            validation: false,
            strict: false,
        }
    }
}

/// Builds compiled graphs from agent lists and pattern names.
pub struct GraphFactory {
    registry: PatternRegistry,
    nodes: NodeTable,
    cache: Arc<dyn GraphStore>,
    default_validator: Arc<dyn WorkflowValidator>,
    enhanced: Option<Arc<EnhancedConditionalPattern>>,
    defaults: BuildDefaults,
    recursion_limit: usize,
}

impl fmt::Debug for GraphFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphFactory")
            .field("default_validator", &self.default_validator.name())
            .field("has_enhanced", &self.enhanced.is_some())
            .field("defaults", &self.defaults)
            .field("recursion_limit", &self.recursion_limit)
            .finish_non_exhaustive()
    }
}

impl GraphFactory {
    /// Built-in patterns, an in-memory cache and the domain validator.
    pub fn new(nodes: NodeTable) -> Self {
        let enhanced = Arc::new(EnhancedConditionalPattern::new());
        Self {
            registry: PatternRegistry::with_enhanced(Arc::clone(&enhanced)),
            nodes,
            cache: Arc::new(GraphCache::default()),
            default_validator: Arc::new(DomainWorkflowValidator),
            enhanced: Some(enhanced),
            defaults: BuildDefaults::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Apply the `[graph]`, `[validation]`, `[routing]` and `[fallback]` sections.
    pub fn from_config(nodes: NodeTable, config: &TrellisConfig) -> Result<Self> {
        let enhanced = Arc::new(EnhancedConditionalPattern::from_config(config)?);
        let cache = GraphCache::new(
            config.graph.cache.max_size,
            Duration::from_secs(config.graph.cache.ttl_secs),
        );
        let mut factory = Self::new(nodes)
            .with_store(Arc::new(cache))
            .with_enhanced_pattern(enhanced)
            .with_recursion_limit(config.graph.recursion_limit);
        factory.defaults = BuildDefaults {
            pattern: config.graph.default_pattern.trim().to_lowercase(),
            cache_enabled: config.graph.cache.enabled,
            validation: config.validation.enabled,
            strict: config.validation.strict_mode,
        };
        info!(
            default_pattern = %factory.defaults.pattern,
            cache = factory.defaults.cache_enabled,
            validation = factory.defaults.validation,
            "Graph factory configured"
        );
        Ok(factory)
    }

    /// Replace the pattern registry. Drops the enhanced-pattern handle.
    pub fn with_registry(mut self, registry: PatternRegistry) -> Self {
        self.registry = registry;
        self.enhanced = None;
        self
    }

    /// Register an enhanced pattern and keep a handle to its routing state.
    pub fn with_enhanced_pattern(mut self, enhanced: Arc<EnhancedConditionalPattern>) -> Self {
        self.registry.register(enhanced.clone());
        self.enhanced = Some(enhanced);
        self
    }

    pub fn with_store(mut self, cache: Arc<dyn GraphStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_default_validator(mut self, validator: Arc<dyn WorkflowValidator>) -> Self {
        self.default_validator = validator;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn enhanced_pattern(&self) -> Option<&Arc<EnhancedConditionalPattern>> {
        self.enhanced.as_ref()
    }

    /// A build config for `agents` carrying this factory's defaults.
    pub fn graph_config<S: AsRef<str>>(&self, agents: &[S]) -> GraphConfig {
        GraphConfig::new(agents.iter().map(|a| a.as_ref().to_string()))
            .with_pattern(self.defaults.pattern.clone())
            .with_cache(self.defaults.cache_enabled)
            .with_validation(self.defaults.validation)
            .strict(self.defaults.strict)
    }

    /// Build (or fetch from cache) the graph described by `config`.
    pub fn create_graph(
        &self,
        config: &GraphConfig,
    ) -> std::result::Result<Arc<CompiledGraph>, GraphBuildError> {
        let agents = normalize_agents(&config.agents);
        let pattern_name = config.pattern_name.trim().to_lowercase();

        let checkpointer: Option<Arc<dyn CheckpointSaver>> = if config.enable_checkpoints {
            let saver = config.memory_manager.as_ref().and_then(|m| m.memory_saver());
            if saver.is_none() {
                warn!(
                    pattern = %pattern_name,
                    "Checkpointing requested but no memory saver is available, compiling without it"
                );
            }
            saver
        } else {
            None
        };
        // Keyed on what is attached, not on what was asked for.
        let key = CacheKey::new(
            &pattern_name,
            &agents,
            checkpointer.is_some(),
            GRAPH_FACTORY_VERSION,
        );

        if config.cache_enabled {
            if let Some(graph) = self.cache.get(&key) {
                debug!(key = %key, "Graph cache hit");
                return Ok(graph);
            }
        }

        info!(pattern = %pattern_name, agents = ?agents, "Creating graph");

        if config.enable_validation {
            let validator = config
                .validator
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.default_validator));
            let mut context = config.validation_context.clone().unwrap_or_default();
            context.strict_mode = config.validator_strict_mode;
            let result = validator.validate_workflow(&agents, &pattern_name, &context);
            for issue in result.issues() {
                debug!(validator = validator.name(), %issue, "Validation finding");
            }
            if result.has_errors() {
                warn!(
                    pattern = %pattern_name,
                    errors = ?result.errors(),
                    "Workflow validation failed"
                );
                return Err(ValidationError::new(&pattern_name, agents, result).into());
            }
            if result.has_warnings() {
                warn!(pattern = %pattern_name, warnings = ?result.warnings(), "Workflow validation warnings");
            }
        }

        let pattern = self.registry.get_pattern(&pattern_name).ok_or_else(|| {
            GraphBuildError::PatternNotFound {
                pattern: pattern_name.clone(),
                available: self.registry.list_patterns(),
            }
        })?;
        if !pattern.validate_agents(&agents) {
            return Err(GraphBuildError::InvariantViolation(format!(
                "pattern '{}' cannot lay out agents {:?}",
                pattern_name, agents
            )));
        }

        let mut builder = GraphBuilder::new(&pattern_name);
        builder.set_recursion_limit(self.recursion_limit);
        for agent in &agents {
            builder.add_node(agent.as_str(), self.nodes.resolve(agent)?);
        }

        let has_refiner = has_agent(&agents, AgentKind::Refiner);
        let has_data_query = has_agent(&agents, AgentKind::DataQuery);
        let has_synthesis = has_agent(&agents, AgentKind::Synthesis);

        let (edges, entry) = if pattern_name == CONDITIONAL && has_refiner {
            let (edges, router) = conditional_routing(&agents);
            builder.add_conditional_edges(router);
            (edges, Some(AgentKind::Refiner.as_str().to_string()))
        } else {
            let edges = if has_data_query && has_synthesis {
                data_query_spine(has_refiner)
            } else {
                with_safety_overlays(pattern.get_edges(&agents), &agents)
            };
            let entry = if has_data_query {
                let first = if has_refiner {
                    AgentKind::Refiner
                } else {
                    AgentKind::DataQuery
                };
                Some(first.as_str().to_string())
            } else {
                pattern.get_entry_point(&agents)
            };
            (edges, entry)
        };

        check_invariants(&agents, &edges, entry.as_deref())?;

        for edge in edges {
            builder.add_edge(edge);
        }
        builder
            .set_entry_point(entry)
            .set_exit_points(pattern.get_exit_points(&agents));
        if !(has_data_query && has_synthesis) {
            builder.set_parallel_groups(pattern.get_parallel_groups(&agents));
        }

        let graph = Arc::new(builder.compile(checkpointer)?);
        info!(
            pattern = %pattern_name,
            graph = %graph.id(),
            nodes = graph.node_names().len(),
            edges = graph.edges().len(),
            "Graph created"
        );

        if config.cache_enabled {
            return Ok(self.cache.insert(key, graph));
        }
        Ok(graph)
    }

    pub fn create_standard_graph<S: AsRef<str>>(
        &self,
        agents: &[S],
    ) -> std::result::Result<Arc<CompiledGraph>, GraphBuildError> {
        self.create_graph(&self.graph_config(agents).with_pattern(STANDARD))
    }

    pub fn create_parallel_graph<S: AsRef<str>>(
        &self,
        agents: &[S],
    ) -> std::result::Result<Arc<CompiledGraph>, GraphBuildError> {
        self.create_graph(&self.graph_config(agents).with_pattern(PARALLEL))
    }

    pub fn create_conditional_graph<S: AsRef<str>>(
        &self,
        agents: &[S],
    ) -> std::result::Result<Arc<CompiledGraph>, GraphBuildError> {
        self.create_graph(&self.graph_config(agents).with_pattern(CONDITIONAL))
    }

    /// True when the list is non-empty and every agent has a node.
    pub fn validate_agents<S: AsRef<str>>(&self, agents: &[S]) -> bool {
        let agents = normalize_agents(agents);
        !agents.is_empty() && agents.iter().all(|a| self.nodes.contains(a))
    }

    /// Run semantic validation without building anything.
    pub fn validate_workflow<S: AsRef<str>>(
        &self,
        agents: &[S],
        pattern: &str,
        validator: Option<Arc<dyn WorkflowValidator>>,
        strict: bool,
    ) -> ValidationResult {
        let agents = normalize_agents(agents);
        let validator = validator.unwrap_or_else(|| Arc::clone(&self.default_validator));
        validator.validate_workflow(
            &agents,
            &pattern.trim().to_lowercase(),
            &ValidationContext::strict(strict),
        )
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Graph cache cleared");
    }

    /// Drop cached graphs for one pattern.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.cache.invalidate_pattern(&pattern.trim().to_lowercase())
    }

    pub fn get_available_patterns(&self) -> Vec<String> {
        self.registry.list_patterns()
    }
}

/// `refiner -> data_query -> synthesis -> END`, refiner optional.
fn data_query_spine(has_refiner: bool) -> Vec<Edge> {
    let refiner = AgentKind::Refiner.as_str();
    let data_query = AgentKind::DataQuery.as_str();
    let synthesis = AgentKind::Synthesis.as_str();

    let mut edges = Vec::with_capacity(3);
    if has_refiner {
        edges.push(Edge::new(refiner, data_query));
    }
    edges.push(Edge::new(data_query, synthesis));
    edges.push(Edge::to_end(synthesis));
    edges
}

/// Add the edges data_query and synthesis always need, if missing.
fn with_safety_overlays(mut edges: Vec<Edge>, agents: &[String]) -> Vec<Edge> {
    let has_refiner = has_agent(agents, AgentKind::Refiner);
    let has_data_query = has_agent(agents, AgentKind::DataQuery);
    let has_synthesis = has_agent(agents, AgentKind::Synthesis);
    let data_query = AgentKind::DataQuery.as_str();

    if has_refiner && has_data_query {
        push_unique(&mut edges, Edge::new(AgentKind::Refiner.as_str(), data_query));
    }
    if has_synthesis {
        push_unique(&mut edges, Edge::to_end(AgentKind::Synthesis.as_str()));
    }
    if has_data_query && !has_synthesis {
        push_unique(&mut edges, Edge::to_end(data_query));
    }
    edges
}

/// With data_query and synthesis both present: something must feed
/// synthesis, refiner must not bypass data_query, and synthesis is not
/// the entry.
pub fn check_invariants(
    agents: &[String],
    edges: &[Edge],
    entry: Option<&str>,
) -> std::result::Result<(), GraphBuildError> {
    if !(has_agent(agents, AgentKind::DataQuery) && has_agent(agents, AgentKind::Synthesis)) {
        return Ok(());
    }
    let synthesis = AgentKind::Synthesis.as_str();

    if !edges.iter().any(|e| e.to == synthesis) {
        return Err(GraphBuildError::InvariantViolation(
            "no edge leads to synthesis while data_query is present".to_string(),
        ));
    }
    if let Some(bypass) = edges
        .iter()
        .find(|e| e.connects(AgentKind::Refiner.as_str(), synthesis))
    {
        return Err(GraphBuildError::InvariantViolation(format!(
            "edge {} bypasses data_query",
            bypass
        )));
    }
    if entry == Some(synthesis) {
        return Err(GraphBuildError::InvariantViolation(
            "synthesis cannot be the entry point while data_query is present".to_string(),
        ));
    }
    Ok(())
}
