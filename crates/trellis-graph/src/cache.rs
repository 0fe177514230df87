//! Cache of compiled graphs keyed by build configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::compiled::CompiledGraph;

pub const DEFAULT_MAX_SIZE: usize = 50;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Identity of a graph build: pattern, agent set, checkpointing, factory version.
///
/// Agents are sorted and deduplicated, so list order does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pattern: String,
    key: String,
}

impl CacheKey {
    pub fn new(pattern: &str, agents: &[String], checkpoints: bool, version: &str) -> Self {
        let mut sorted: Vec<&str> = agents.iter().map(|a| a.as_str()).collect();
        sorted.sort_unstable();
        sorted.dedup();
        Self {
            pattern: pattern.to_string(),
            key: format!(
                "{}|{}|checkpoints={}|v{}",
                pattern,
                sorted.join(","),
                checkpoints,
                version
            ),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Cache counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Storage for compiled graphs.
pub trait GraphStore: Send + Sync {
    /// A live entry, or `None` (counted as a miss).
    fn get(&self, key: &CacheKey) -> Option<Arc<CompiledGraph>>;

    /// Store a graph and return the canonical instance for the key.
    ///
    /// If a live entry already exists, that entry wins and is returned.
    fn insert(&self, key: CacheKey, graph: Arc<CompiledGraph>) -> Arc<CompiledGraph>;

    fn clear(&self);

    fn stats(&self) -> CacheStats;

    /// Drop every entry built from `pattern`. Returns how many were removed.
    fn invalidate_pattern(&self, pattern: &str) -> usize;
}

struct Entry {
    graph: Arc<CompiledGraph>,
    created_at: Instant,
    last_accessed: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// In-memory LRU cache with a time-to-live.
pub struct GraphCache {
    inner: Mutex<Inner>,
    max_size: usize,
    ttl: Duration,
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}

impl GraphCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_size: max_size.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_live(&self, entry: &Entry) -> bool {
        entry.created_at.elapsed() < self.ttl
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GraphStore for GraphCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<CompiledGraph>> {
        let mut inner = self.lock();
        let live = inner.entries.get(key).map(|e| self.is_live(e));
        match live {
            Some(true) => {
                inner.hits += 1;
                let entry = inner.entries.get_mut(key)?;
                entry.last_accessed = Instant::now();
                Some(Arc::clone(&entry.graph))
            }
            Some(false) => {
                inner.entries.remove(key);
                inner.evictions += 1;
                inner.misses += 1;
                debug!(key = %key, "Cached graph expired");
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    fn insert(&self, key: CacheKey, graph: Arc<CompiledGraph>) -> Arc<CompiledGraph> {
        let mut inner = self.lock();

        if let Some(existing) = inner.entries.get(&key) {
            if self.is_live(existing) {
                return Arc::clone(&existing.graph);
            }
        }

        while inner.entries.len() >= self.max_size && !inner.entries.contains_key(&key) {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.evictions += 1;
            debug!(key = %oldest, "Evicted least recently used graph");
        }

        let now = Instant::now();
        inner.entries.insert(
            key,
            Entry {
                graph: Arc::clone(&graph),
                created_at: now,
                last_accessed: now,
            },
        );
        graph
    }

    fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }

    fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| k.pattern() != pattern);
        before - inner.entries.len()
    }
}
