use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use trellis_core::error::Result;
use trellis_core::traits::{Checkpoint, CheckpointSaver, MemoryManager};

/// In-process checkpoint store, one list of snapshots per thread.
#[derive(Default)]
pub struct MemorySaver {
    threads: Mutex<HashMap<String, Vec<Checkpoint>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Checkpoint>>> {
        self.threads.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop every checkpoint for a thread. Returns how many were removed.
    pub fn delete(&self, thread_id: &str) -> usize {
        self.lock().remove(thread_id).map_or(0, |cps| cps.len())
    }

    pub fn thread_count(&self) -> usize {
        self.lock().len()
    }
}

impl CheckpointSaver for MemorySaver {
    fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.lock();
        let list = threads.entry(checkpoint.thread_id.clone()).or_default();
        // Re-saving a step replaces it.
        list.retain(|cp| cp.step != checkpoint.step);
        list.push(checkpoint);
        list.sort_by_key(|cp| cp.step);
        Ok(())
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .lock()
            .get(thread_id)
            .and_then(|list| list.last().cloned()))
    }

    fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self.lock().get(thread_id).cloned().unwrap_or_default())
    }
}

/// Memory manager that hands out a shared saver, or none.
#[derive(Clone, Default)]
pub struct CheckpointMemory {
    saver: Option<Arc<dyn CheckpointSaver>>,
}

impl CheckpointMemory {
    /// Backed by a fresh [`MemorySaver`].
    pub fn in_memory() -> Self {
        Self::with_saver(Arc::new(MemorySaver::new()))
    }

    pub fn with_saver(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver: Some(saver) }
    }

    /// A manager with checkpointing unavailable.
    pub fn disabled() -> Self {
        Self { saver: None }
    }
}

impl MemoryManager for CheckpointMemory {
    fn memory_saver(&self) -> Option<Arc<dyn CheckpointSaver>> {
        self.saver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn checkpoint(thread: &str, step: usize) -> Checkpoint {
        Checkpoint {
            thread_id: thread.to_string(),
            step,
            completed_nodes: vec!["refiner".to_string()],
            state: json!({"step": step}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let saver = MemorySaver::new();
        saver.save(checkpoint("t1", 2)).unwrap();
        saver.save(checkpoint("t1", 1)).unwrap();
        saver.save(checkpoint("t2", 1)).unwrap();

        let latest = saver.latest("t1").unwrap().unwrap();
        assert_eq!(latest.step, 2);
        let steps: Vec<usize> = saver.list("t1").unwrap().iter().map(|c| c.step).collect();
        assert_eq!(steps, vec![1, 2]);
        assert_eq!(saver.thread_count(), 2);
    }

    #[test]
    fn test_resave_replaces_step() {
        let saver = MemorySaver::new();
        saver.save(checkpoint("t", 1)).unwrap();
        saver.save(checkpoint("t", 1)).unwrap();
        assert_eq!(saver.list("t").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_and_missing_thread() {
        let saver = MemorySaver::new();
        saver.save(checkpoint("t", 1)).unwrap();
        assert_eq!(saver.delete("t"), 1);
        assert!(saver.latest("t").unwrap().is_none());
        assert!(saver.list("nope").unwrap().is_empty());
    }

    #[test]
    fn test_memory_manager_variants() {
        assert!(CheckpointMemory::in_memory().memory_saver().is_some());
        assert!(CheckpointMemory::disabled().memory_saver().is_none());
    }
}
