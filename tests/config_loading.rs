use std::io::Write;

use trellis::{TrellisConfig, TrellisError};
use trellis_routing::{FailureAction, FailureType, FallbackCondition};
use trellis_test_utils::{node_table, temp_config};

#[test]
fn test_full_config_parses() {
    let toml_content = r#"
[graph]
default_pattern = "conditional"
recursion_limit = 12

[graph.cache]
enabled = true
max_size = 8
ttl_secs = 60

[validation]
enabled = true
strict_mode = true

[routing]
recommendation_ttl_secs = 30
performance_window = 10
failure_window_secs = 600

[fallback]
keep_defaults = false

[[fallback.rules]]
failed_agent = "historian"
fallback_agents = ["critic"]
condition = "timeout"
priority = 1
max_attempts = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = TrellisConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.graph.default_pattern, "conditional");
    assert_eq!(config.graph.recursion_limit, 12);
    assert_eq!(config.graph.cache.max_size, 8);
    assert_eq!(config.graph.cache.ttl_secs, 60);
    assert!(config.validation.enabled);
    assert!(config.validation.strict_mode);
    assert_eq!(config.routing.recommendation_ttl_secs, 30);
    assert_eq!(config.routing.performance_window, 10);
    assert_eq!(config.routing.failure_window_secs, 600);
    assert!(!config.fallback.keep_defaults);
    assert_eq!(config.fallback.rules.len(), 1);
    assert_eq!(config.fallback.rules[0].fallback_agents, vec!["critic"]);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("TRELLIS_IT_DEFAULT_PATTERN", "parallel");

    let toml_content = r#"
[graph]
default_pattern = "${TRELLIS_IT_DEFAULT_PATTERN}"
"#;

    let tmp = temp_config(toml_content).expect("write temp config");
    let config = TrellisConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.graph.default_pattern, "parallel");

    std::env::remove_var("TRELLIS_IT_DEFAULT_PATTERN");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let tmp = temp_config("").expect("write temp config");
    let config = TrellisConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.graph.default_pattern, "standard");
    assert_eq!(config.graph.recursion_limit, 25);
    assert!(config.graph.cache.enabled);
    assert!(!config.validation.enabled);
    assert!(config.fallback.keep_defaults);
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = TrellisConfig::load(std::path::Path::new("/nonexistent/trellis.toml")).unwrap_err();
    assert!(matches!(err, TrellisError::ConfigNotFound(_)));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let tmp = temp_config("[graph\ndefault_pattern = ").expect("write temp config");
    let err = TrellisConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, TrellisError::Config(_)));
}

#[test]
fn test_unknown_fallback_condition_rejected_by_factory() {
    let tmp = temp_config(
        r#"
[[fallback.rules]]
failed_agent = "critic"
condition = "sometimes"
"#,
    )
    .expect("write temp config");
    let err = trellis::factory_from_path(node_table(), tmp.path()).unwrap_err();
    assert!(matches!(err, TrellisError::Config(ref msg) if msg.contains("sometimes")));
}

#[test]
fn test_factory_from_path_applies_sections() {
    let tmp = temp_config(
        r#"
[graph]
default_pattern = "Parallel"

[graph.cache]
enabled = false

[fallback]
keep_defaults = false

[[fallback.rules]]
failed_agent = "Historian"
fallback_agents = ["Critic"]
condition = "timeout"
max_attempts = 1
"#,
    )
    .expect("write temp config");

    let factory = trellis::factory_from_path(node_table(), tmp.path()).expect("build factory");
    let config = factory.graph_config(&["critic", "historian"]);
    assert_eq!(config.pattern_name, "parallel");
    assert!(!config.cache_enabled);

    factory.create_graph(&config).expect("build graph");
    assert_eq!(factory.get_cache_stats().size, 0);

    let enhanced = factory.enhanced_pattern().expect("enhanced pattern");
    let rules = enhanced.fallback_manager().rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].failed_agent, "historian");
    assert_eq!(rules[0].condition, FallbackCondition::Timeout);

    let handling = enhanced.handle_agent_failure("historian", FailureType::Timeout, None);
    assert_eq!(handling.action, FailureAction::Fallback);
    assert_eq!(handling.fallback_agents, vec!["critic"]);

    let handling = enhanced.handle_agent_failure("historian", FailureType::Timeout, None);
    assert_eq!(handling.action, FailureAction::Skip);
}
