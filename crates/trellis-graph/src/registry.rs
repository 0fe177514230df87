use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::pattern::{
    ConditionalPattern, EnhancedConditionalPattern, GraphPattern, ParallelPattern, StandardPattern,
};

/// Registry of graph patterns, keyed by lowercase name.
#[derive(Clone)]
pub struct PatternRegistry {
    patterns: BTreeMap<String, Arc<dyn GraphPattern>>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PatternRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            patterns: BTreeMap::new(),
        }
    }

    /// A registry with standard, parallel, conditional and enhanced_conditional.
    pub fn with_defaults() -> Self {
        Self::with_enhanced(Arc::new(EnhancedConditionalPattern::new()))
    }

    /// Built-in patterns, using the given enhanced pattern instance so the
    /// caller can keep a handle on its routing state.
    pub fn with_enhanced(enhanced: Arc<EnhancedConditionalPattern>) -> Self {
        let mut registry = Self::new();
        registry.register_pattern(StandardPattern);
        registry.register_pattern(ParallelPattern);
        registry.register_pattern(ConditionalPattern);
        registry.register(enhanced);
        registry
    }

    /// Register a pattern, replacing any with the same name.
    pub fn register(&mut self, pattern: Arc<dyn GraphPattern>) {
        let name = pattern.name().to_lowercase();
        debug!(pattern = %name, "Registered graph pattern");
        self.patterns.insert(name, pattern);
    }

    pub fn register_pattern(&mut self, pattern: impl GraphPattern) {
        self.register(Arc::new(pattern));
    }

    /// Unregister a pattern by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.patterns.remove(&name.to_lowercase()).is_some()
    }

    /// Case-insensitive lookup.
    pub fn get_pattern(&self, name: &str) -> Option<Arc<dyn GraphPattern>> {
        self.patterns.get(&name.trim().to_lowercase()).cloned()
    }

    /// Registered names, sorted.
    pub fn list_patterns(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    /// (name, description) pairs, sorted by name.
    pub fn pattern_info(&self) -> Vec<(String, String)> {
        self.patterns
            .iter()
            .map(|(name, p)| (name.clone(), p.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::Edge;

    struct LinePattern;

    impl GraphPattern for LinePattern {
        fn name(&self) -> &str {
            "Line"
        }

        fn description(&self) -> &str {
            "Agents in list order"
        }

        fn get_edges(&self, agents: &[String]) -> Vec<Edge> {
            let mut edges: Vec<Edge> = agents.windows(2).map(|w| Edge::new(&w[0], &w[1])).collect();
            if let Some(last) = agents.last() {
                edges.push(Edge::to_end(last));
            }
            edges
        }

        fn get_entry_point(&self, agents: &[String]) -> Option<String> {
            agents.first().cloned()
        }

        fn get_exit_points(&self, agents: &[String]) -> Vec<String> {
            agents.last().cloned().into_iter().collect()
        }
    }

    #[test]
    fn test_defaults() {
        let registry = PatternRegistry::with_defaults();
        assert_eq!(
            registry.list_patterns(),
            vec!["conditional", "enhanced_conditional", "parallel", "standard"]
        );
        assert!(registry.get_pattern("STANDARD").is_some());
        assert!(registry.get_pattern(" parallel ").is_some());
        assert!(registry.get_pattern("mesh").is_none());
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = PatternRegistry::new();
        assert!(registry.is_empty());
        registry.register_pattern(LinePattern);
        assert!(registry.get_pattern("line").is_some());
        assert_eq!(
            registry.pattern_info(),
            vec![("line".to_string(), "Agents in list order".to_string())]
        );
        assert!(registry.unregister("LINE"));
        assert!(!registry.unregister("line"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = PatternRegistry::with_defaults();
        registry.register_pattern(StandardPattern);
        assert_eq!(registry.len(), 4);
    }
}
