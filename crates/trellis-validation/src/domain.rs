//! Rules specific to the refiner / analysis / synthesis agent vocabulary.

use tracing::debug;

use trellis_core::types::AgentKind;
use trellis_core::validation::{ValidationIssue, ValidationResult};

use crate::validator::{base_checks, escalate, unsupported_pattern, ValidationContext, WorkflowValidator};

const SUPPORTED: &[&str] = &["standard", "parallel", "conditional", "enhanced_conditional"];

/// Domain validator for the known agent vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainWorkflowValidator;

impl DomainWorkflowValidator {
    pub fn new() -> Self {
        Self
    }
}

struct Composition {
    kinds: Vec<AgentKind>,
    len: usize,
}

impl Composition {
    fn has(&self, kind: AgentKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn analyzers(&self) -> usize {
        let mut found: Vec<AgentKind> = self.kinds.iter().copied().filter(|k| k.is_analyzer()).collect();
        found.dedup();
        found.len()
    }

    fn synthesis_only(&self) -> bool {
        self.len == 1 && self.has(AgentKind::Synthesis)
    }
}

impl WorkflowValidator for DomainWorkflowValidator {
    fn name(&self) -> &str {
        "domain"
    }

    fn supported_patterns(&self) -> Option<&[&'static str]> {
        Some(SUPPORTED)
    }

    fn validate_workflow(
        &self,
        agents: &[String],
        pattern: &str,
        context: &ValidationContext,
    ) -> ValidationResult {
        let mut result = base_checks(agents);
        if agents.is_empty() {
            return result;
        }

        if !SUPPORTED.contains(&pattern) {
            result.add(unsupported_pattern(self.name(), pattern, SUPPORTED));
            return result;
        }

        let mut kinds = Vec::with_capacity(agents.len());
        for agent in agents {
            match agent.parse::<AgentKind>() {
                Ok(kind) => kinds.push(kind),
                Err(_) => result.add(
                    ValidationIssue::new(
                        escalate(context.strict_mode),
                        format!("Unknown agent '{}'", agent),
                    )
                    .with_agent(agent.as_str())
                    .with_suggestion("Known agents: refiner, data_query, critic, historian, synthesis")
                    .with_code("unknown_agent"),
                ),
            }
        }
        kinds.sort();
        let composition = Composition {
            kinds,
            len: agents.len(),
        };

        match pattern {
            "parallel" => check_parallel(&composition, &mut result),
            _ => check_sequential(&composition, context, &mut result),
        }
        if matches!(pattern, "conditional" | "enhanced_conditional") {
            check_conditional(&composition, &mut result);
        }

        debug!(
            pattern,
            issues = result.len(),
            valid = result.is_valid(),
            "Domain validation complete"
        );
        result
    }
}

fn check_sequential(c: &Composition, context: &ValidationContext, result: &mut ValidationResult) {
    let has_synthesis = c.has(AgentKind::Synthesis);
    let analyzers = c.analyzers();

    if has_synthesis && analyzers == 0 {
        result.add(
            ValidationIssue::new(
                escalate(context.strict_mode),
                "Synthesis without critic or historian has no analysis to combine",
            )
            .with_agent("synthesis")
            .with_suggestion("Add critic or historian before synthesis")
            .with_code("synthesis_without_analysis"),
        );
    }

    if analyzers > 0 && !has_synthesis {
        result.add(
            ValidationIssue::info("Analysis agents without synthesis return unmerged outputs")
                .with_suggestion("Add synthesis to combine analysis results")
                .with_code("analysis_without_synthesis"),
        );
    }

    if c.len > 2 && !c.has(AgentKind::Refiner) {
        result.add(
            ValidationIssue::warning("Workflows with more than two agents should start with refiner")
                .with_agent("refiner")
                .with_suggestion("Add refiner to clarify the query before analysis")
                .with_code("missing_refiner"),
        );
    }

    if c.synthesis_only() {
        result.add(
            ValidationIssue::warning("Synthesis-only workflow has no upstream output to synthesize")
                .with_agent("synthesis")
                .with_suggestion("Add refiner and at least one analysis agent")
                .with_code("synthesis_only"),
        );
    }
}

fn check_parallel(c: &Composition, result: &mut ValidationResult) {
    if c.synthesis_only() {
        result.add(
            ValidationIssue::warning("Synthesis-only workflow gains nothing from parallel execution")
                .with_agent("synthesis")
                .with_suggestion("Use the standard pattern or add analysis agents")
                .with_code("synthesis_only"),
        );
    }

    let analyzers = c.analyzers();
    if analyzers >= 2 {
        result.add(
            ValidationIssue::info(format!(
                "Parallel pattern runs {} analysis agents concurrently",
                analyzers
            ))
            .with_code("parallel_analysis"),
        );
    }
}

fn check_conditional(c: &Composition, result: &mut ValidationResult) {
    if !c.has(AgentKind::Refiner) {
        result.add(
            ValidationIssue::warning("Conditional pattern without refiner cannot route at runtime")
                .with_agent("refiner")
                .with_suggestion("Add refiner; routing decisions are taken when it completes")
                .with_code("conditional_without_refiner"),
        );
    }

    if c.analyzers() < 2 {
        result.add(
            ValidationIssue::info("Conditional routing has fewer than two analysis agents to choose from")
                .with_code("few_routing_choices"),
        );
    }
}
