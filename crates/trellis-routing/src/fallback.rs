use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use trellis_core::config::{FallbackRuleConfig, FallbackSettings};
use trellis_core::error::{Result, TrellisError};

/// Failure rate above which the recommendation suggests dropping the agent.
const HIGH_FAILURE_RATE: f64 = 0.5;

/// Events kept per agent for failure-rate computation.
const MAX_EVENTS: usize = 200;

/// Upper bound on the failure window (ten years).
const MAX_WINDOW_SECS: u64 = 315_360_000;

fn agent_key(agent: &str) -> String {
    agent.trim().to_lowercase()
}

/// Why an agent failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Error,
    Timeout,
    PerformancePoor,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Error => "error",
            FailureType::Timeout => "timeout",
            FailureType::PerformancePoor => "performance_poor",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a fallback rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCondition {
    Always,
    Error,
    Timeout,
    PerformancePoor,
}

impl FallbackCondition {
    pub fn matches(&self, failure: FailureType) -> bool {
        match self {
            FallbackCondition::Always => true,
            FallbackCondition::Error => failure == FailureType::Error,
            FallbackCondition::Timeout => failure == FailureType::Timeout,
            FallbackCondition::PerformancePoor => failure == FailureType::PerformancePoor,
        }
    }
}

impl FromStr for FallbackCondition {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(FallbackCondition::Always),
            "error" => Ok(FallbackCondition::Error),
            "timeout" => Ok(FallbackCondition::Timeout),
            "performance_poor" => Ok(FallbackCondition::PerformancePoor),
            other => Err(TrellisError::Config(format!(
                "unknown fallback condition: {}",
                other
            ))),
        }
    }
}

/// Declarative substitution policy for a failed agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub failed_agent: String,
    pub fallback_agents: Vec<String>,
    pub condition: FallbackCondition,
    /// Lower runs first.
    pub priority: u32,
    pub max_attempts: u32,
}

impl FallbackRule {
    pub fn new(
        failed_agent: impl Into<String>,
        fallback_agents: Vec<&str>,
        condition: FallbackCondition,
        priority: u32,
        max_attempts: u32,
    ) -> Self {
        let failed_agent: String = failed_agent.into();
        Self {
            failed_agent: agent_key(&failed_agent),
            fallback_agents: fallback_agents.into_iter().map(agent_key).collect(),
            condition,
            priority,
            max_attempts,
        }
    }

    /// The built-in rule set.
    pub fn defaults() -> Vec<FallbackRule> {
        vec![
            FallbackRule::new("critic", vec!["synthesis"], FallbackCondition::Always, 1, 2),
            FallbackRule::new("historian", vec![], FallbackCondition::Always, 2, 1),
            FallbackRule::new("refiner", vec!["synthesis"], FallbackCondition::Error, 1, 1),
            FallbackRule::new("synthesis", vec!["critic"], FallbackCondition::Error, 3, 1),
        ]
    }
}

impl TryFrom<&FallbackRuleConfig> for FallbackRule {
    type Error = TrellisError;

    fn try_from(cfg: &FallbackRuleConfig) -> Result<Self> {
        if cfg.failed_agent.trim().is_empty() {
            return Err(TrellisError::Config("fallback rule without failed_agent".into()));
        }
        Ok(Self {
            failed_agent: agent_key(&cfg.failed_agent),
            fallback_agents: cfg.fallback_agents.iter().map(|a| agent_key(a)).collect(),
            condition: cfg.condition.parse()?,
            priority: cfg.priority,
            max_attempts: cfg.max_attempts,
        })
    }
}

/// What to do after an agent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    Fallback,
    Skip,
}

/// Outcome of [`FallbackManager::handle_failure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureHandling {
    pub action: FailureAction,
    pub fallback_agents: Vec<String>,
    pub failure_rate: f64,
    pub recommendation: String,
}

#[derive(Debug, Default)]
struct FallbackState {
    attempts: HashMap<String, u32>,
    /// (when, failed) per agent.
    events: HashMap<String, VecDeque<(DateTime<Utc>, bool)>>,
}

/// Maps failed agents to substitutes and tracks attempts per agent.
pub struct FallbackManager {
    rules: Vec<FallbackRule>,
    failure_window: Duration,
    state: Mutex<FallbackState>,
}

impl Default for FallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackManager {
    /// A manager with the built-in rules.
    pub fn new() -> Self {
        let mut manager = Self::empty();
        for rule in FallbackRule::defaults() {
            manager.add_rule(rule);
        }
        manager
    }

    /// A manager with no rules.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            failure_window: Duration::hours(1),
            state: Mutex::new(FallbackState::default()),
        }
    }

    /// Build from configuration, keeping or replacing the built-in rules.
    pub fn from_settings(settings: &FallbackSettings, failure_window_secs: u64) -> Result<Self> {
        let mut manager = if settings.keep_defaults {
            Self::new()
        } else {
            Self::empty()
        };
        for cfg in &settings.rules {
            manager.add_rule(FallbackRule::try_from(cfg)?);
        }
        manager.failure_window = Duration::seconds(failure_window_secs.min(MAX_WINDOW_SECS) as i64);
        Ok(manager)
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// Add a rule, keeping rules ordered by priority (stable for ties).
    pub fn add_rule(&mut self, rule: FallbackRule) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority);
    }

    pub fn rules(&self) -> &[FallbackRule] {
        &self.rules
    }

    fn lock(&self) -> MutexGuard<'_, FallbackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Substitutes for a failed agent under the first matching rule.
    ///
    /// Consumes one attempt. Returns nothing once that rule's
    /// `max_attempts` is used up, until [`reset_attempts`](Self::reset_attempts).
    /// Agent names are matched case-insensitively.
    pub fn get_fallback_agents(&self, failed_agent: &str, failure: FailureType) -> Vec<String> {
        self.take_fallback(&agent_key(failed_agent), failure, None)
    }

    /// Like [`get_fallback_agents`](Self::get_fallback_agents), limited to
    /// `remaining`. An attempt is only consumed when a substitute is offered.
    fn take_fallback(
        &self,
        failed_agent: &str,
        failure: FailureType,
        remaining: Option<&[String]>,
    ) -> Vec<String> {
        let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.failed_agent == failed_agent && r.condition.matches(failure))
        else {
            debug!(agent = %failed_agent, %failure, "No fallback rule matches");
            return Vec::new();
        };

        let mut offered = rule.fallback_agents.clone();
        if let Some(remaining) = remaining {
            offered.retain(|a| remaining.iter().any(|r| agent_key(r) == *a));
        }
        if offered.is_empty() {
            return offered;
        }

        let mut state = self.lock();
        let attempts = state.attempts.entry(failed_agent.to_string()).or_insert(0);
        if *attempts >= rule.max_attempts {
            warn!(
                agent = %failed_agent,
                attempts = *attempts,
                max_attempts = rule.max_attempts,
                "Fallback attempts exhausted"
            );
            return Vec::new();
        }
        *attempts += 1;
        offered
    }

    pub fn record_failure(&self, agent: &str) {
        self.record_event(agent, true);
    }

    pub fn record_success(&self, agent: &str) {
        self.record_event(agent, false);
    }

    fn record_event(&self, agent: &str, failed: bool) {
        let now = Utc::now();
        let cutoff = now - self.failure_window;
        let mut state = self.lock();
        let events = state.events.entry(agent_key(agent)).or_default();
        events.push_back((now, failed));
        while events.len() > MAX_EVENTS {
            events.pop_front();
        }
        while events.front().is_some_and(|(at, _)| *at < cutoff) {
            events.pop_front();
        }
    }

    /// Failed fraction of this agent's outcomes within the failure window.
    pub fn failure_rate(&self, agent: &str) -> f64 {
        let cutoff = Utc::now() - self.failure_window;
        let state = self.lock();
        let Some(events) = state.events.get(&agent_key(agent)) else {
            return 0.0;
        };
        let recent: Vec<bool> = events
            .iter()
            .filter(|(at, _)| *at >= cutoff)
            .map(|(_, failed)| *failed)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().filter(|f| **f).count() as f64 / recent.len() as f64
    }

    pub fn attempts(&self, agent: &str) -> u32 {
        self.lock().attempts.get(&agent_key(agent)).copied().unwrap_or(0)
    }

    pub fn reset_attempts(&self, agent: &str) {
        self.lock().attempts.remove(&agent_key(agent));
    }

    pub fn reset_all(&self) {
        let mut state = self.lock();
        state.attempts.clear();
        state.events.clear();
    }

    /// Record the failure and decide between falling back and skipping.
    ///
    /// When `remaining` is given, substitutes are limited to agents in it,
    /// and a failure with nothing left to offer does not use up an attempt.
    pub fn handle_failure(
        &self,
        failed_agent: &str,
        failure: FailureType,
        remaining: Option<&[String]>,
    ) -> FailureHandling {
        let key = agent_key(failed_agent);
        let failed_agent = key.as_str();
        self.record_failure(failed_agent);

        let fallback_agents = self.take_fallback(failed_agent, failure, remaining);
        let failure_rate = self.failure_rate(failed_agent);

        let action = if fallback_agents.is_empty() {
            FailureAction::Skip
        } else {
            FailureAction::Fallback
        };

        let mut recommendation = match action {
            FailureAction::Fallback => format!(
                "Agent '{}' failed ({}); falling back to {}",
                failed_agent,
                failure,
                fallback_agents.join(", ")
            ),
            FailureAction::Skip => format!(
                "Agent '{}' failed ({}); skipping it, no fallback available",
                failed_agent, failure
            ),
        };
        if failure_rate > HIGH_FAILURE_RATE {
            recommendation.push_str(&format!(
                ". High failure rate ({:.0}%), consider removing '{}' from the workflow",
                failure_rate * 100.0,
                failed_agent
            ));
        }

        info!(
            agent = %failed_agent,
            %failure,
            ?action,
            fallbacks = ?fallback_agents,
            failure_rate,
            "Handled agent failure"
        );

        FailureHandling {
            action,
            fallback_agents,
            failure_rate,
            recommendation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_ordered_by_priority() {
        let manager = FallbackManager::new();
        let priorities: Vec<u32> = manager.rules().iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert_eq!(manager.rules().len(), 4);
    }

    #[test]
    fn test_critic_falls_back_to_synthesis_until_exhausted() {
        let manager = FallbackManager::new();
        assert_eq!(manager.get_fallback_agents("critic", FailureType::Error), vec!["synthesis"]);
        assert_eq!(manager.get_fallback_agents("critic", FailureType::Timeout), vec!["synthesis"]);
        assert!(manager.get_fallback_agents("critic", FailureType::Error).is_empty());
        assert_eq!(manager.attempts("critic"), 2);

        manager.reset_attempts("critic");
        assert_eq!(manager.get_fallback_agents("critic", FailureType::Error), vec!["synthesis"]);
    }

    #[test]
    fn test_refiner_rule_only_on_error() {
        let manager = FallbackManager::new();
        assert!(manager.get_fallback_agents("refiner", FailureType::Timeout).is_empty());
        assert_eq!(manager.attempts("refiner"), 0);
        assert_eq!(manager.get_fallback_agents("refiner", FailureType::Error), vec!["synthesis"]);
    }

    #[test]
    fn test_historian_is_skipped() {
        let manager = FallbackManager::new();
        let handling = manager.handle_failure("historian", FailureType::Timeout, None);
        assert_eq!(handling.action, FailureAction::Skip);
        assert!(handling.fallback_agents.is_empty());
        assert!(handling.recommendation.contains("skipping"));
    }

    #[test]
    fn test_fallbacks_filtered_to_remaining() {
        let manager = FallbackManager::new();
        let remaining = vec!["refiner".to_string(), "historian".to_string()];
        let handling = manager.handle_failure("critic", FailureType::Error, Some(&remaining));
        assert_eq!(handling.action, FailureAction::Skip);
        assert!(handling.fallback_agents.is_empty());

        assert_eq!(manager.attempts("critic"), 0);

        let remaining = vec!["synthesis".to_string()];
        let handling = manager.handle_failure("critic", FailureType::Error, Some(&remaining));
        assert_eq!(handling.action, FailureAction::Fallback);
        assert_eq!(handling.fallback_agents, vec!["synthesis"]);
        assert_eq!(manager.attempts("critic"), 1);
    }

    #[test]
    fn test_filtered_out_failures_keep_attempts() {
        let manager = FallbackManager::new();
        let remaining = vec!["historian".to_string()];
        for _ in 0..5 {
            let handling = manager.handle_failure("critic", FailureType::Error, Some(&remaining));
            assert_eq!(handling.action, FailureAction::Skip);
        }
        assert_eq!(manager.attempts("critic"), 0);
        assert_eq!(manager.get_fallback_agents("critic", FailureType::Error), vec!["synthesis"]);
    }

    #[test]
    fn test_agent_names_match_case_insensitively() {
        let manager = FallbackManager::new();
        let handling = manager.handle_failure(" Critic ", FailureType::Error, None);
        assert_eq!(handling.action, FailureAction::Fallback);
        assert_eq!(handling.fallback_agents, vec!["synthesis"]);
        assert_eq!(manager.attempts("critic"), 1);
        assert_eq!(manager.attempts("CRITIC"), 1);
        assert!((manager.failure_rate("critic") - 1.0).abs() < 1e-9);

        let remaining = vec!["Synthesis".to_string()];
        let handling = manager.handle_failure("CRITIC", FailureType::Timeout, Some(&remaining));
        assert_eq!(handling.fallback_agents, vec!["synthesis"]);

        manager.reset_attempts("Critic");
        assert_eq!(manager.attempts("critic"), 0);

        let rule = FallbackRule::new("Historian", vec!["Critic"], FallbackCondition::Always, 1, 1);
        assert_eq!(rule.failed_agent, "historian");
        assert_eq!(rule.fallback_agents, vec!["critic"]);
    }

    #[test]
    fn test_failure_rate_tracks_outcomes() {
        let manager = FallbackManager::new();
        assert_eq!(manager.failure_rate("synthesis"), 0.0);
        manager.record_success("synthesis");
        manager.record_failure("synthesis");
        assert!((manager.failure_rate("synthesis") - 0.5).abs() < 1e-9);

        let handling = manager.handle_failure("synthesis", FailureType::Error, None);
        assert!(handling.failure_rate > 0.6);
        assert!(handling.recommendation.contains("High failure rate"));
    }

    #[test]
    fn test_expired_history_is_ignored() {
        let manager = FallbackManager::new().with_failure_window(Duration::seconds(-1));
        manager.record_failure("critic");
        assert_eq!(manager.failure_rate("critic"), 0.0);
    }

    #[test]
    fn test_rule_from_config() {
        let cfg = FallbackRuleConfig {
            failed_agent: "Historian".into(),
            fallback_agents: vec!["Critic".into()],
            condition: "timeout".into(),
            priority: 0,
            max_attempts: 3,
        };
        let rule = FallbackRule::try_from(&cfg).unwrap();
        assert_eq!(rule.failed_agent, "historian");
        assert_eq!(rule.fallback_agents, vec!["critic"]);
        assert_eq!(rule.condition, FallbackCondition::Timeout);

        let bad = FallbackRuleConfig {
            condition: "sometimes".into(),
            ..cfg
        };
        assert!(FallbackRule::try_from(&bad).is_err());
    }

    #[test]
    fn test_custom_rule_takes_precedence() {
        let settings = FallbackSettings {
            keep_defaults: true,
            rules: vec![FallbackRuleConfig {
                failed_agent: "historian".into(),
                fallback_agents: vec!["critic".into()],
                condition: "timeout".into(),
                priority: 0,
                max_attempts: 1,
            }],
        };
        let manager = FallbackManager::from_settings(&settings, 3600).unwrap();
        assert_eq!(manager.get_fallback_agents("historian", FailureType::Timeout), vec!["critic"]);
    }
}
