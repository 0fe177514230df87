use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Coarse complexity bucket derived from the complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl ComplexityLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.25 {
            ComplexityLevel::Simple
        } else if score < 0.5 {
            ComplexityLevel::Moderate
        } else if score < 0.75 {
            ComplexityLevel::Complex
        } else {
            ComplexityLevel::VeryComplex
        }
    }
}

/// Policy governing which agent subset runs for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingStrategy {
    Streamlined,
    Standard,
    Comprehensive,
    PerformanceOptimized,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingStrategy::Streamlined => "streamlined",
            RoutingStrategy::Standard => "standard",
            RoutingStrategy::Comprehensive => "comprehensive",
            RoutingStrategy::PerformanceOptimized => "performance_optimized",
        };
        f.write_str(s)
    }
}

/// Heuristic read of a single query. Lives for one routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub complexity_score: f64,
    pub complexity_level: ComplexityLevel,
    pub word_count: usize,
    pub question_count: usize,
    pub technical_terms: usize,
    pub requires_research: bool,
    pub requires_criticism: bool,
    pub routing_strategy: RoutingStrategy,
}

const HIGH_COMPLEXITY: &[&str] = &[
    r"\b(analy[sz]e|compare|evaluate|synthesi[sz]e|comprehensive|detailed)\b",
    r"\b(multiple|various|several|different)\b",
    r"\b(relationship|correlation|causation|impact|implications?)\b",
    r"\?[^?]*\?",
];

const MEDIUM_COMPLEXITY: &[&str] = &[
    r"\b(explain|describe|discuss|outline|summari[sz]e)\b",
    r"\b(how|why|what if)\b",
    r"\b(process|method|approach|strategy)\b",
];

const LOW_COMPLEXITY: &[&str] = &[
    r"\b(what is|define|list|name)\b",
    r"\b(yes|no|true|false)\b",
    r"^.{1,50}$",
];

const RESEARCH: &[&str] = &[
    r"\b(history|historical|past|previous|background|origins?)\b",
    r"\b(research|study|studies|investigation|evidence)\b",
    r"\b(sources?|references?|citations?|literature)\b",
    r"\b(trends?|patterns?|development|evolution)\b",
];

const CRITICISM: &[&str] = &[
    r"\b(critique|criticism|criticize|evaluate|assess|judge)\b",
    r"\b(pros|cons|advantages|disadvantages)\b",
    r"\b(strengths?|weaknesses|limitations?|flaws?)\b",
    r"\b(argue|debate|controversial|dispute)\b",
];

const ACRONYM: &str = r"\b[A-Z]{2,}\b";
const JARGON: &str = r"\b\w+(tion|ism|ogy|ics|ware)\b";

/// Regex-based query analyzer.
pub struct ContextAnalyzer {
    high: Vec<Regex>,
    medium: Vec<Regex>,
    low: Vec<Regex>,
    research: Vec<Regex>,
    criticism: Vec<Regex>,
    acronym: Vec<Regex>,
    jargon: Vec<Regex>,
}

impl Default for ContextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAnalyzer {
    pub fn new() -> Self {
        Self {
            high: compile(HIGH_COMPLEXITY),
            medium: compile(MEDIUM_COMPLEXITY),
            low: compile(LOW_COMPLEXITY),
            research: compile(RESEARCH),
            criticism: compile(CRITICISM),
            acronym: compile(&[ACRONYM]),
            jargon: compile(&[JARGON]),
        }
    }

    /// Score a query and pick a routing strategy for it.
    pub fn analyze(&self, query: &str) -> ContextAnalysis {
        let trimmed = query.trim();
        let lower = trimmed.to_lowercase();

        let word_count = trimmed.split_whitespace().count();
        let question_count = trimmed.matches('?').count();
        let technical_terms = count_matches(&self.acronym, trimmed) + count_matches(&self.jargon, &lower);

        let high = hits(&self.high, &lower);
        let medium = hits(&self.medium, &lower);
        let low = hits(&self.low, &lower);

        let length_score = word_count.min(100) as f64 / 100.0 * 0.3;
        let extra_questions = question_count.saturating_sub(1) as f64 * 0.1;
        let technical = technical_terms.min(4) as f64 * 0.05;
        let raw = high as f64 * 0.25 + medium as f64 * 0.15 - low as f64 * 0.1
            + length_score
            + extra_questions
            + technical;
        let complexity_score = raw.clamp(0.0, 1.0);
        let complexity_level = ComplexityLevel::from_score(complexity_score);

        let requires_research = hits(&self.research, &lower) > 0;
        let requires_criticism = hits(&self.criticism, &lower) > 0;

        let routing_strategy = choose_strategy(complexity_level, requires_research, requires_criticism);

        debug!(
            complexity_score,
            ?complexity_level,
            word_count,
            requires_research,
            requires_criticism,
            strategy = %routing_strategy,
            "Analyzed query context"
        );

        ContextAnalysis {
            complexity_score,
            complexity_level,
            word_count,
            question_count,
            technical_terms,
            requires_research,
            requires_criticism,
            routing_strategy,
        }
    }
}

fn choose_strategy(level: ComplexityLevel, research: bool, criticism: bool) -> RoutingStrategy {
    match level {
        ComplexityLevel::Simple if !research && !criticism => RoutingStrategy::Streamlined,
        ComplexityLevel::VeryComplex => RoutingStrategy::Comprehensive,
        ComplexityLevel::Complex if research && criticism => RoutingStrategy::Comprehensive,
        _ => RoutingStrategy::Standard,
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %p, error = %e, "Invalid analyzer pattern, skipping");
                None
            }
        })
        .collect()
}

/// Number of patterns that match at least once.
fn hits(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().filter(|re| re.is_match(text)).count()
}

fn count_matches(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().map(|re| re.find_iter(text).count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_definition_is_streamlined() {
        let analysis = ContextAnalyzer::new().analyze("What is Rust?");
        assert_eq!(analysis.complexity_level, ComplexityLevel::Simple);
        assert_eq!(analysis.routing_strategy, RoutingStrategy::Streamlined);
        assert_eq!(analysis.word_count, 3);
        assert_eq!(analysis.question_count, 1);
        assert!(!analysis.requires_research);
        assert!(!analysis.requires_criticism);
    }

    #[test]
    fn test_rich_query_is_comprehensive() {
        let query = "Analyze and compare the historical impact of multiple economic policies, \
                     evaluate their strengths and weaknesses, and explain why they differ?";
        let analysis = ContextAnalyzer::new().analyze(query);
        assert_eq!(analysis.complexity_level, ComplexityLevel::VeryComplex);
        assert_eq!(analysis.routing_strategy, RoutingStrategy::Comprehensive);
        assert!(analysis.requires_research);
        assert!(analysis.requires_criticism);
        assert!((analysis.complexity_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_clamped() {
        let analyzer = ContextAnalyzer::new();
        for query in ["", "no", "yes?", "Why?"] {
            let a = analyzer.analyze(query);
            assert!((0.0..=1.0).contains(&a.complexity_score), "{query}");
        }
    }

    #[test]
    fn test_technical_terms_counted() {
        let analysis = ContextAnalyzer::new().analyze("How does the JVM handle serialization in HTTP APIs");
        // JVM, HTTP, serialization
        assert_eq!(analysis.technical_terms, 3);
    }

    #[test]
    fn test_research_without_heavy_complexity_is_standard() {
        let analysis = ContextAnalyzer::new().analyze("Describe the history of the printing press");
        assert!(analysis.requires_research);
        assert_eq!(analysis.routing_strategy, RoutingStrategy::Standard);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(ComplexityLevel::from_score(0.0), ComplexityLevel::Simple);
        assert_eq!(ComplexityLevel::from_score(0.25), ComplexityLevel::Moderate);
        assert_eq!(ComplexityLevel::from_score(0.5), ComplexityLevel::Complex);
        assert_eq!(ComplexityLevel::from_score(0.75), ComplexityLevel::VeryComplex);
        assert!(ComplexityLevel::Moderate > ComplexityLevel::Simple);
    }
}
