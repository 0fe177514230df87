use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub fallback: FallbackSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Pattern used when a caller does not name one.
    #[serde(default = "default_pattern")]
    pub default_pattern: String,
    /// Maximum supersteps a compiled graph may run.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            default_pattern: default_pattern(),
            recursion_limit: default_recursion_limit(),
            cache: CacheSettings::default(),
        }
    }
}

fn default_pattern() -> String {
    "standard".to_string()
}

fn default_recursion_limit() -> usize {
    25
}

/// Compiled-graph cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Maximum cached graphs before least-recently-used eviction.
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    /// Seconds an entry stays valid.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_size: default_cache_max_size(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool { true }

fn default_cache_max_size() -> usize { 50 }

fn default_cache_ttl() -> u64 { 3600 }

/// Default semantic-validation behavior for graph builds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strict_mode: bool,
}

/// Adaptive routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Seconds a recommendation stays memoized.
    #[serde(default = "default_recommendation_ttl")]
    pub recommendation_ttl_secs: u64,
    /// Samples kept per agent by the performance tracker.
    #[serde(default = "default_performance_window")]
    pub performance_window: usize,
    /// Seconds of history used for failure rates.
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            recommendation_ttl_secs: default_recommendation_ttl(),
            performance_window: default_performance_window(),
            failure_window_secs: default_failure_window(),
        }
    }
}

fn default_recommendation_ttl() -> u64 { 300 }

fn default_performance_window() -> usize { 50 }

fn default_failure_window() -> u64 { 3600 }

/// Fallback rules layered over (or replacing) the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    /// Keep the built-in rules alongside configured ones.
    #[serde(default = "default_keep_builtin_rules")]
    pub keep_defaults: bool,
    #[serde(default)]
    pub rules: Vec<FallbackRuleConfig>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            keep_defaults: default_keep_builtin_rules(),
            rules: Vec::new(),
        }
    }
}

fn default_keep_builtin_rules() -> bool { true }

/// A fallback rule as written in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRuleConfig {
    pub failed_agent: String,
    #[serde(default)]
    pub fallback_agents: Vec<String>,
    /// One of `always`, `error`, `timeout`, `performance_poor`.
    #[serde(default = "default_rule_condition")]
    pub condition: String,
    #[serde(default = "default_rule_priority")]
    pub priority: u32,
    #[serde(default = "default_rule_max_attempts")]
    pub max_attempts: u32,
}

fn default_rule_condition() -> String {
    "always".to_string()
}

fn default_rule_priority() -> u32 { 1 }

fn default_rule_max_attempts() -> u32 { 2 }

impl TrellisConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading trellis config");
        let content = std::fs::read_to_string(path)
            .map_err(|_| TrellisError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse config from a TOML string, with env var expansion.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| TrellisError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
