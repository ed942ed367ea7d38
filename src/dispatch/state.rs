//! Shared per-job state tracking for error-handling layers.
//!
//! Retry, failover and loop layers all keep one transient state per
//! in-flight job, keyed by owning process and matched by index equality.
//! Lookups hand out snapshots so no tracker lock is ever held while calling
//! into a neighboring layer.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::{Index, ProcessId};

/// A per-job state matched by index equality.
pub(crate) trait Tracked: Send + Sync {
    fn index(&self) -> &Index;
}

/// Per-owning-process lists of in-flight job states.
pub(crate) struct StateTracker<S: Tracked> {
    states: DashMap<ProcessId, Vec<Arc<S>>>,
}

impl<S: Tracked> Default for StateTracker<S> {
    fn default() -> Self {
        Self {
            states: DashMap::new(),
        }
    }
}

impl<S: Tracked> StateTracker<S> {
    /// Record a fresh in-flight state.
    pub(crate) fn track(&self, process: &ProcessId, state: Arc<S>) {
        self.states
            .entry(process.clone())
            .or_default()
            .push(state);
    }

    /// Snapshot the state matching `index`, leaving it tracked.
    pub(crate) fn find(&self, process: &ProcessId, index: &Index) -> Option<Arc<S>> {
        self.states
            .get(process)
            .and_then(|list| list.iter().find(|s| s.index() == index).cloned())
    }

    /// Remove and return the first state matching `index`.
    pub(crate) fn forget(&self, process: &ProcessId, index: &Index) -> Option<Arc<S>> {
        let mut list = self.states.get_mut(process)?;
        let at = list.iter().position(|s| s.index() == index)?;
        Some(list.remove(at))
    }

    /// Drop every state for `process`.
    pub(crate) fn clear(&self, process: &ProcessId) {
        self.states.remove(process);
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self, process: &ProcessId) -> usize {
        self.states.get(process).map_or(0, |l| l.len())
    }
}
