use std::collections::BTreeSet;

use tracing::debug;

use trellis_core::validation::{ValidationIssue, ValidationResult};

use crate::validator::{base_checks, escalate, unsupported_pattern, ValidationContext, WorkflowValidator};

const SUPPORTED: &[&str] = &["conditional", "enhanced_conditional"];

/// Agents below this success rate are flagged.
pub const MIN_SUCCESS_RATE: f64 = 0.7;

/// Agents slower than this on average are noted.
pub const SLOW_AGENT_MS: f64 = 10_000.0;

/// Cross-checks a conditional workflow against routing constraints,
/// the query's context analysis and live agent performance.
///
/// In strict mode an unmet research or criticism need is an error.
/// Performance findings stay advisory either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalPatternValidator;

impl ConditionalPatternValidator {
    pub fn new() -> Self {
        Self
    }
}

impl WorkflowValidator for ConditionalPatternValidator {
    fn name(&self) -> &str {
        "conditional"
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

        let present: BTreeSet<&str> = agents.iter().map(|a| a.as_str()).collect();

        if let Some(ref routing) = context.routing {
            let count = present.len();
            if count < routing.min_agents {
                result.add(
                    ValidationIssue::error(format!(
                        "Routing strategy '{}' needs at least {} agents, got {}",
                        routing.name, routing.min_agents, count
                    ))
                    .with_code("too_few_agents"),
                );
            }
            if count > routing.max_agents {
                result.add(
                    ValidationIssue::warning(format!(
                        "Routing strategy '{}' expects at most {} agents, got {}",
                        routing.name, routing.max_agents, count
                    ))
                    .with_suggestion("Drop agents the strategy would not select")
                    .with_code("too_many_agents"),
                );
            }
            for required in &routing.required_agents {
                if !present.contains(required.as_str()) {
                    result.add(
                        ValidationIssue::error(format!(
                            "Routing strategy '{}' requires agent '{}'",
                            routing.name, required
                        ))
                        .with_agent(required.as_str())
                        .with_code("missing_required_agent"),
                    );
                }
            }
        }

        if let Some(ref analysis) = context.analysis {
            let severity = escalate(context.strict_mode);
            if analysis.requires_research && !present.contains("historian") {
                result.add(
                    ValidationIssue::new(severity, "Query needs research but historian is not in the workflow")
                        .with_agent("historian")
                        .with_suggestion("Add historian for background and sources")
                        .with_code("research_unmet"),
                );
            }
            if analysis.requires_criticism && !present.contains("critic") {
                result.add(
                    ValidationIssue::new(
                        severity,
                        "Query needs critical evaluation but critic is not in the workflow",
                    )
                        .with_agent("critic")
                        .with_suggestion("Add critic to weigh strengths and weaknesses")
                        .with_code("criticism_unmet"),
                );
            }
        }

        for agent in &present {
            let Some(perf) = context.performance.get(*agent) else {
                continue;
            };
            if perf.success_rate < MIN_SUCCESS_RATE {
                result.add(
                    ValidationIssue::warning(format!(
                        "Agent '{}' has a low success rate ({:.0}%)",
                        agent,
                        perf.success_rate * 100.0
                    ))
                    .with_agent(*agent)
                    .with_suggestion("Configure a fallback rule or drop the agent")
                    .with_code("low_success_rate"),
                );
            }
            if perf.average_time_ms > SLOW_AGENT_MS {
                result.add(
                    ValidationIssue::info(format!(
                        "Agent '{}' averages {:.1}s per run",
                        agent,
                        perf.average_time_ms / 1000.0
                    ))
                    .with_agent(*agent)
                    .with_code("slow_agent"),
                );
            }
        }

        debug!(pattern, issues = result.len(), "Conditional validation complete");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;
    use trellis_routing::{AgentPerformance, ContextAnalyzer};

    use trellis_core::validation::ValidationSeverity;

    use crate::validator::RoutingConstraints;

    fn names(agents: &[&str]) -> Vec<String> {
        agents.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_rejects_non_conditional_pattern() {
        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner"]),
            "standard",
            &ValidationContext::new(),
        );
        assert!(!result.is_valid());
    }

    #[test]
    fn test_routing_bounds_and_required_agents() {
        let ctx = ValidationContext::new().with_routing(
            RoutingConstraints::new("streamlined", 2, 2).with_required(&["refiner", "synthesis"]),
        );
        let result = ConditionalPatternValidator.validate_workflow(&names(&["critic"]), "conditional", &ctx);
        let codes: Vec<_> = result.issues().iter().filter_map(|i| i.code.as_deref()).collect();
        assert_eq!(codes.iter().filter(|c| **c == "missing_required_agent").count(), 2);
        assert!(codes.contains(&"too_few_agents"));

        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner", "critic", "synthesis"]),
            "conditional",
            &ctx,
        );
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_analysis_requirements() {
        let analysis = ContextAnalyzer::new()
            .analyze("Evaluate the historical evidence for and against the policy");
        assert!(analysis.requires_research && analysis.requires_criticism);
        let ctx = ValidationContext::new().with_analysis(analysis);
        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner", "synthesis"]),
            "conditional",
            &ctx,
        );
        assert_eq!(result.warnings().len(), 2);
        assert!(result.is_valid());
    }

    #[test]
    fn test_strict_mode_escalates_unmet_analysis_needs() {
        let analysis = ContextAnalyzer::new()
            .analyze("Evaluate the historical evidence for and against the policy");
        let mut ctx = ValidationContext::strict(true).with_analysis(analysis);
        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner", "synthesis"]),
            "conditional",
            &ctx,
        );
        assert!(!result.is_valid());
        let codes: Vec<_> = result
            .issues_with(ValidationSeverity::Error)
            .iter()
            .filter_map(|i| i.code.as_deref())
            .collect();
        assert_eq!(codes, vec!["research_unmet", "criticism_unmet"]);

        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner", "critic", "historian", "synthesis"]),
            "conditional",
            &ctx,
        );
        assert!(result.is_valid());

        ctx.performance.insert(
            "critic".to_string(),
            AgentPerformance {
                average_time_ms: 900.0,
                success_rate: 0.4,
                samples: 10,
                last_updated: Utc::now(),
            },
        );
        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner", "critic", "historian", "synthesis"]),
            "conditional",
            &ctx,
        );
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_performance_findings() {
        let mut perf = HashMap::new();
        perf.insert(
            "critic".to_string(),
            AgentPerformance {
                average_time_ms: 12_000.0,
                success_rate: 0.5,
                samples: 10,
                last_updated: Utc::now(),
            },
        );
        perf.insert(
            "synthesis".to_string(),
            AgentPerformance {
                average_time_ms: 800.0,
                success_rate: 0.95,
                samples: 10,
                last_updated: Utc::now(),
            },
        );
        let ctx = ValidationContext::new().with_performance(perf);
        let result = ConditionalPatternValidator.validate_workflow(
            &names(&["refiner", "critic", "synthesis"]),
            "enhanced_conditional",
            &ctx,
        );
        assert_eq!(result.warnings().len(), 1);
        assert_eq!(result.infos().len(), 1);
        assert!(result.warnings()[0].contains("critic"));
    }
}
