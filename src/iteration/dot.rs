//! Dot-product combination state.

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;
use tracing::warn;

use crate::iteration::node::{NodeEvent, Partial};
use crate::model::{Index, ProcessId};

#[derive(Default)]
struct DotProcess {
    /// Index-keyed tree of per-child tries; an entry is evicted the moment
    /// it fills.
    slots: BTreeMap<Index, Vec<Option<Partial>>>,
    completed: HashSet<usize>,
}

/// Per-owning-process state of one dot node.
#[derive(Default)]
pub(crate) struct DotState {
    per_process: DashMap<ProcessId, DotProcess>,
}

impl DotState {
    pub(crate) fn receive(
        &self,
        process: &ProcessId,
        slot: usize,
        n_children: usize,
        event: NodeEvent,
    ) -> Vec<NodeEvent> {
        match event {
            NodeEvent::Partial(partial) => {
                let mut proc = self.per_process.entry(process.clone()).or_default();
                if proc.completed.contains(&slot) {
                    warn!(process = %process, slot, index = %partial.index,
                          "dot input received token after its completion; dropped");
                    return Vec::new();
                }
                let index = partial.index.clone();
                let entry = proc
                    .slots
                    .entry(index.clone())
                    .or_insert_with(|| (0..n_children).map(|_| None).collect());
                if entry[slot].is_some() {
                    warn!(process = %process, slot, index = %index,
                          "duplicate dot token at index; replacing");
                }
                entry[slot] = Some(partial);
                if entry.iter().all(Option::is_some) {
                    let parts = proc.slots.remove(&index).unwrap_or_default();
                    let merged =
                        Partial::merge(index, parts.iter().filter_map(Option::as_ref));
                    vec![NodeEvent::Partial(merged)]
                } else {
                    Vec::new()
                }
            }
            NodeEvent::Completion => {
                let finished = {
                    let mut proc = self.per_process.entry(process.clone()).or_default();
                    proc.completed.insert(slot);
                    proc.completed.len() == n_children
                };
                if finished {
                    if let Some((_, proc)) = self.per_process.remove(process) {
                        if !proc.slots.is_empty() {
                            warn!(process = %process, pending = proc.slots.len(),
                                  "dot node completed with unmatched partial jobs");
                        }
                    }
                    vec![NodeEvent::Completion]
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub(crate) fn clear(&self, process: &ProcessId) {
        self.per_process.remove(process);
    }
}
