use std::sync::Arc;
use std::thread;

use trellis::prelude::*;
use trellis::GraphBuildError;
use trellis_core::types::Edge;
use trellis_core::ValidationSeverity;
use trellis_test_utils::{in_memory_checkpoints, init_tracing, node_table};

fn factory() -> GraphFactory {
    init_tracing();
    GraphFactory::new(node_table())
}

fn sorted(mut edges: Vec<Edge>) -> Vec<Edge> {
    edges.sort();
    edges
}

#[test]
fn test_refiner_synthesis_standard() {
    let graph = factory()
        .create_standard_graph(&["refiner", "synthesis"])
        .expect("build graph");
    assert_eq!(
        sorted(graph.edges().to_vec()),
        sorted(vec![Edge::new("refiner", "synthesis"), Edge::to_end("synthesis")])
    );
    assert_eq!(graph.entry_point(), Some("refiner"));
}

#[test]
fn test_spine_forced_for_standard() {
    let graph = factory()
        .create_standard_graph(&["data_query", "synthesis", "refiner"])
        .expect("build graph");
    assert_eq!(
        sorted(graph.edges().to_vec()),
        sorted(vec![
            Edge::new("refiner", "data_query"),
            Edge::new("data_query", "synthesis"),
            Edge::to_end("synthesis"),
        ])
    );
    assert_eq!(graph.entry_point(), Some("refiner"));
    assert!(!graph.has_edge("refiner", "synthesis"));
}

#[test]
fn test_parallel_without_synthesis_has_no_entry() {
    let graph = factory()
        .create_parallel_graph(&["critic", "historian"])
        .expect("build graph");
    assert_eq!(
        sorted(graph.edges().to_vec()),
        sorted(vec![Edge::to_end("critic"), Edge::to_end("historian")])
    );
    assert_eq!(graph.entry_point(), None);
    assert_eq!(graph.parallel_groups().len(), 1);
}

#[test]
fn test_spine_holds_for_every_pattern() {
    let factory = factory();
    for pattern in ["standard", "parallel", "conditional", "enhanced_conditional"] {
        let config = GraphConfig::new(["synthesis", "historian", "data_query", "refiner", "critic"])
            .with_pattern(pattern)
            .with_cache(false);
        let graph = factory.create_graph(&config).expect("build graph");
        assert!(
            graph.edges().iter().any(|e| e.to == "synthesis"),
            "{pattern}: nothing feeds synthesis"
        );
        assert!(!graph.has_edge("refiner", "synthesis"), "{pattern}: refiner bypasses data_query");
        assert_ne!(graph.entry_point(), Some("synthesis"), "{pattern}");
    }
}

const AGENTS: [&str; 5] = ["refiner", "data_query", "critic", "historian", "synthesis"];

fn subsets() -> impl Iterator<Item = Vec<String>> {
    (1u32..1 << AGENTS.len()).map(|mask| {
        AGENTS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, a)| a.to_string())
            .collect()
    })
}

#[test]
fn test_every_agent_has_an_edge_in_every_subset() {
    let factory = factory();
    for name in ["standard", "parallel"] {
        let pattern = factory.registry().get_pattern(name).expect("registered pattern");
        for agents in subsets() {
            let edges = pattern.get_edges(&agents);
            for agent in &agents {
                assert!(
                    edges.iter().any(|e| e.from == *agent || e.to == *agent),
                    "{name} {agents:?}: {agent} has no edge"
                );
            }
        }
    }
}

#[test]
fn test_spine_holds_for_every_subset() {
    let factory = factory();
    for pattern in ["standard", "parallel", "conditional", "enhanced_conditional"] {
        for agents in subsets() {
            let spine = agents.iter().any(|a| a == "data_query") && agents.iter().any(|a| a == "synthesis");
            let config = GraphConfig::new(agents.clone())
                .with_pattern(pattern)
                .with_cache(false);
            let graph = factory
                .create_graph(&config)
                .unwrap_or_else(|e| panic!("{pattern} {agents:?}: {e}"));
            if !spine {
                continue;
            }
            assert!(
                graph.edges().iter().any(|e| e.to == "synthesis"),
                "{pattern} {agents:?}: nothing feeds synthesis"
            );
            assert!(
                !graph.has_edge("refiner", "synthesis"),
                "{pattern} {agents:?}: refiner bypasses data_query"
            );
            assert_ne!(graph.entry_point(), Some("synthesis"), "{pattern} {agents:?}");
        }
    }
}

#[test]
fn test_agent_order_does_not_change_graph() {
    let factory = factory();
    let a = factory
        .create_graph(&GraphConfig::new(["refiner", "critic", "historian", "synthesis"]).with_cache(false))
        .expect("build graph");
    let b = factory
        .create_graph(&GraphConfig::new(["Synthesis", "historian", "CRITIC", "refiner"]).with_cache(false))
        .expect("build graph");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(sorted(a.edges().to_vec()), sorted(b.edges().to_vec()));
    assert_eq!(a.entry_point(), b.entry_point());
    assert_eq!(a.exit_points(), b.exit_points());
}

#[test]
fn test_cache_shared_across_threads() {
    let factory = Arc::new(factory());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let factory = Arc::clone(&factory);
            thread::spawn(move || {
                factory
                    .create_standard_graph(&["refiner", "critic", "synthesis"])
                    .expect("build graph")
            })
        })
        .collect();
    let graphs: Vec<Arc<CompiledGraph>> = handles
        .into_iter()
        .map(|h| h.join().expect("join builder thread"))
        .collect();
    for graph in &graphs[1..] {
        assert!(Arc::ptr_eq(&graphs[0], graph));
    }
    assert_eq!(factory.get_cache_stats().size, 1);
}

#[test]
fn test_invalidate_pattern_keeps_others() {
    let factory = factory();
    let standard = factory.create_standard_graph(&["refiner", "critic"]).expect("standard");
    factory.create_parallel_graph(&["refiner", "critic"]).expect("parallel");
    assert_eq!(factory.invalidate_pattern("Parallel"), 1);
    assert_eq!(factory.get_cache_stats().size, 1);

    let again = factory.create_standard_graph(&["critic", "refiner"]).expect("standard");
    assert!(Arc::ptr_eq(&standard, &again));
}

#[test]
fn test_checkpointed_graph_has_saver() {
    let graph = factory()
        .create_graph(&GraphConfig::new(["refiner", "synthesis"]).with_checkpoints(in_memory_checkpoints()))
        .expect("build graph");
    assert!(graph.has_checkpointer());
}

#[test]
fn test_graph_without_saver_is_not_served_for_checkpointed_config() {
    let factory = factory();
    let bare = factory
        .create_graph(&GraphConfig::new(["refiner", "synthesis"]).checkpoints(true))
        .expect("build graph");
    assert!(!bare.has_checkpointer());

    let checkpointed = factory
        .create_graph(&GraphConfig::new(["refiner", "synthesis"]).with_checkpoints(in_memory_checkpoints()))
        .expect("build graph");
    assert!(checkpointed.has_checkpointer());
    assert!(!Arc::ptr_eq(&bare, &checkpointed));
}

#[test]
fn test_validate_workflow_synthesis_only_warns() {
    let result = factory().validate_workflow(&["synthesis"], "standard", None, false);
    assert!(result.is_valid());
    assert!(result
        .issues_with(ValidationSeverity::Warning)
        .iter()
        .any(|i| i.message.starts_with("Synthesis-only workflow")));
}

#[test]
fn test_validate_workflow_empty_is_error() {
    let result = factory().validate_workflow::<&str>(&[], "standard", None, false);
    assert!(!result.is_valid());
    let errors = result.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("No agents specified"));
}

#[test]
fn test_validation_failure_blocks_build_and_cache() {
    let factory = factory();
    let config = GraphConfig::new(["refiner", "oracle"])
        .with_validation(true)
        .strict(true);
    let err = factory.create_graph(&config).unwrap_err();
    let result = err.validation_result().expect("validation result");
    assert!(result.errors().iter().any(|e| e.contains("oracle")));
    assert_eq!(factory.get_cache_stats().size, 0);

    let lenient = GraphConfig::new(["refiner", "oracle"]).with_validation(true);
    assert!(matches!(
        factory.create_graph(&lenient),
        Err(GraphBuildError::UnknownAgent { .. })
    ));
}

#[test]
fn test_enhanced_conditional_pattern_is_registered() {
    let factory = factory();
    let graph = factory
        .create_graph(
            &GraphConfig::new(["refiner", "critic", "historian", "synthesis"])
                .with_pattern("Enhanced_Conditional"),
        )
        .expect("build graph");
    assert_eq!(graph.pattern(), "enhanced_conditional");
    assert_eq!(graph.entry_point(), Some("refiner"));
    assert_eq!(
        graph.parallel_groups(),
        &[vec!["critic".to_string(), "historian".to_string()]][..]
    );
}
