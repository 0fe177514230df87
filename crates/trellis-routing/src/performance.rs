use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Samples kept per agent unless configured otherwise.
pub const DEFAULT_WINDOW: usize = 50;

/// Score reported for agents with no recorded executions.
pub const NEUTRAL_SCORE: f64 = 0.5;

const FAST_MS: f64 = 500.0;
const SLOW_MS: f64 = 5000.0;

/// Rolling execution metrics, behind an interface so the locking
/// discipline can change without touching callers.
pub trait PerformanceMetrics: Send + Sync {
    fn record_execution(&self, agent: &str, duration_ms: f64, success: bool);

    /// Mean duration over the window, if any samples exist.
    fn average_time_ms(&self, agent: &str) -> Option<f64>;

    /// Fraction of successful samples over the window.
    fn success_rate(&self, agent: &str) -> Option<f64>;

    /// Metrics for every agent seen so far.
    fn snapshot(&self) -> HashMap<String, AgentPerformance>;

    /// `0.4 * time_score + 0.6 * success_rate`, in [0, 1].
    fn performance_score(&self, agent: &str) -> f64 {
        match (self.average_time_ms(agent), self.success_rate(agent)) {
            (Some(avg), Some(rate)) => blend(avg, rate),
            _ => NEUTRAL_SCORE,
        }
    }
}

/// Maps 500ms to 1.0 and 5000ms to 0.0, clamped.
pub fn time_score(average_ms: f64) -> f64 {
    (1.0 - (average_ms - FAST_MS) / (SLOW_MS - FAST_MS)).clamp(0.0, 1.0)
}

fn blend(average_ms: f64, success_rate: f64) -> f64 {
    (0.4 * time_score(average_ms) + 0.6 * success_rate).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Clone)]
struct AgentWindow {
    samples: VecDeque<Sample>,
    last_updated: DateTime<Utc>,
}

/// Point-in-time view of one agent's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub average_time_ms: f64,
    pub success_rate: f64,
    pub samples: usize,
    pub last_updated: DateTime<Utc>,
}

/// In-process tracker keeping the last N samples per agent.
pub struct PerformanceTracker {
    window: usize,
    agents: Mutex<HashMap<String, AgentWindow>>,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            agents: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AgentWindow>> {
        // A panic mid-update can only leave a complete deque behind.
        self.agents.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_count(&self, agent: &str) -> usize {
        self.lock().get(agent).map_or(0, |w| w.samples.len())
    }

    pub fn last_updated(&self, agent: &str) -> Option<DateTime<Utc>> {
        self.lock().get(agent).map(|w| w.last_updated)
    }

    pub fn reset(&self, agent: &str) {
        self.lock().remove(agent);
    }
}

fn summarize(samples: &VecDeque<Sample>) -> Option<(f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let total: f64 = samples.iter().map(|s| s.duration_ms).sum();
    let ok = samples.iter().filter(|s| s.success).count() as f64;
    Some((total / n, ok / n))
}

impl PerformanceMetrics for PerformanceTracker {
    fn record_execution(&self, agent: &str, duration_ms: f64, success: bool) {
        let mut agents = self.lock();
        let entry = agents.entry(agent.to_string()).or_insert_with(|| AgentWindow {
            samples: VecDeque::with_capacity(self.window),
            last_updated: Utc::now(),
        });
        entry.samples.push_back(Sample {
            duration_ms: duration_ms.max(0.0),
            success,
        });
        while entry.samples.len() > self.window {
            entry.samples.pop_front();
        }
        entry.last_updated = Utc::now();
    }

    fn average_time_ms(&self, agent: &str) -> Option<f64> {
        self.lock()
            .get(agent)
            .and_then(|w| summarize(&w.samples))
            .map(|(avg, _)| avg)
    }

    fn success_rate(&self, agent: &str) -> Option<f64> {
        self.lock()
            .get(agent)
            .and_then(|w| summarize(&w.samples))
            .map(|(_, rate)| rate)
    }

    fn snapshot(&self) -> HashMap<String, AgentPerformance> {
        self.lock()
            .iter()
            .filter_map(|(name, w)| {
                let (avg, rate) = summarize(&w.samples)?;
                Some((
                    name.clone(),
                    AgentPerformance {
                        average_time_ms: avg,
                        success_rate: rate,
                        samples: w.samples.len(),
                        last_updated: w.last_updated,
                    },
                ))
            })
            .collect()
    }
}
