use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use trellis_core::validation::{ValidationIssue, ValidationResult, ValidationSeverity};
use trellis_routing::{AgentPerformance, ContextAnalysis};

/// Agent-count bounds and required members for a routing strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConstraints {
    pub name: String,
    pub min_agents: usize,
    pub max_agents: usize,
    #[serde(default)]
    pub required_agents: Vec<String>,
}

impl RoutingConstraints {
    pub fn new(name: impl Into<String>, min_agents: usize, max_agents: usize) -> Self {
        Self {
            name: name.into(),
            min_agents,
            max_agents,
            required_agents: Vec::new(),
        }
    }

    pub fn with_required(mut self, agents: &[&str]) -> Self {
        self.required_agents = agents.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// Extra inputs a validator may consult.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Escalate advisory findings to errors.
    pub strict_mode: bool,
    pub routing: Option<RoutingConstraints>,
    pub analysis: Option<ContextAnalysis>,
    pub performance: HashMap<String, AgentPerformance>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(strict_mode: bool) -> Self {
        Self {
            strict_mode,
            ..Self::default()
        }
    }

    pub fn with_routing(mut self, routing: RoutingConstraints) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_analysis(mut self, analysis: ContextAnalysis) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_performance(mut self, performance: HashMap<String, AgentPerformance>) -> Self {
        self.performance = performance;
        self
    }
}

/// Rule engine that inspects an agent list and pattern name.
pub trait WorkflowValidator: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Patterns this validator understands; `None` accepts any.
    fn supported_patterns(&self) -> Option<&[&'static str]> {
        None
    }

    fn validate_workflow(
        &self,
        agents: &[String],
        pattern: &str,
        context: &ValidationContext,
    ) -> ValidationResult;
}

/// Checks every validator runs: empty list and duplicates.
pub fn base_checks(agents: &[String]) -> ValidationResult {
    let mut result = ValidationResult::new();

    if agents.is_empty() {
        result.add(
            ValidationIssue::error("No agents specified for workflow")
                .with_suggestion("Add at least one agent, e.g. refiner and synthesis")
                .with_code("empty_workflow"),
        );
        return result;
    }

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = agents
        .iter()
        .filter(|a| !seen.insert(a.as_str()))
        .map(|a| a.as_str())
        .collect();
    for agent in duplicates {
        result.add(
            ValidationIssue::warning(format!("Duplicate agent found: {}", agent))
                .with_agent(agent)
                .with_suggestion("Each agent runs once per workflow; remove the duplicate")
                .with_code("duplicate_agent"),
        );
    }

    result
}

/// Issue for a pattern the validator does not cover.
/// Warning normally, error in strict mode.
pub(crate) fn escalate(strict: bool) -> ValidationSeverity {
    if strict {
        ValidationSeverity::Error
    } else {
        ValidationSeverity::Warning
    }
}

pub(crate) fn unsupported_pattern(validator: &str, pattern: &str, supported: &[&str]) -> ValidationIssue {
    ValidationIssue::error(format!(
        "Pattern '{}' is not supported by the {} validator",
        pattern, validator
    ))
    .with_suggestion(format!("Use one of: {}", supported.join(", ")))
    .with_code("unsupported_pattern")
}

/// Generic validator: only the base checks, any pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicWorkflowValidator;

impl WorkflowValidator for BasicWorkflowValidator {
    fn name(&self) -> &str {
        "basic"
    }

    fn validate_workflow(
        &self,
        agents: &[String],
        _pattern: &str,
        _context: &ValidationContext,
    ) -> ValidationResult {
        base_checks(agents)
    }
}
