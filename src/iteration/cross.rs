//! Cross-product combination state.

use dashmap::DashMap;
use tracing::warn;

use crate::iteration::node::{NodeEvent, Partial};
use crate::model::{Index, ProcessId};

struct CrossProcess {
    /// Every partial seen so far, per child.
    caches: Vec<Vec<Partial>>,
    completed: Vec<bool>,
}

impl CrossProcess {
    fn new(n_children: usize) -> Self {
        Self {
            caches: (0..n_children).map(|_| Vec::new()).collect(),
            completed: vec![false; n_children],
        }
    }
}

/// Per-owning-process state of one cross node.
#[derive(Default)]
pub(crate) struct CrossState {
    per_process: DashMap<ProcessId, CrossProcess>,
}

impl CrossState {
    pub(crate) fn receive(
        &self,
        process: &ProcessId,
        slot: usize,
        n_children: usize,
        event: NodeEvent,
    ) -> Vec<NodeEvent> {
        match event {
            NodeEvent::Partial(partial) => {
                let mut proc = self
                    .per_process
                    .entry(process.clone())
                    .or_insert_with(|| CrossProcess::new(n_children));
                if proc.completed[slot] {
                    warn!(process = %process, slot, index = %partial.index,
                          "cross input received token after its completion; dropped");
                    return Vec::new();
                }
                // Combine the newcomer against everything previously cached
                // on every other child, then cache it for future arrivals.
                let emitted = combine(&proc.caches, slot, &partial);
                proc.caches[slot].push(partial);
                emitted
            }
            NodeEvent::Completion => {
                let finished = {
                    let mut proc = self
                        .per_process
                        .entry(process.clone())
                        .or_insert_with(|| CrossProcess::new(n_children));
                    proc.completed[slot] = true;
                    // A child's cache is dead weight once every other child
                    // has completed: no further cross-terms can involve it.
                    for i in 0..n_children {
                        let others_done =
                            (0..n_children).all(|j| j == i || proc.completed[j]);
                        if others_done {
                            proc.caches[i] = Vec::new();
                        }
                    }
                    proc.completed.iter().all(|c| *c)
                };
                if finished {
                    self.per_process.remove(process);
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

/// All combinations taking `newcomer` at `slot` and one cached partial from
/// each other child. Combined index is the concatenation of child indices in
/// child order.
fn combine(caches: &[Vec<Partial>], slot: usize, newcomer: &Partial) -> Vec<NodeEvent> {
    // Tuples of one partial per child, built child-by-child.
    let mut tuples: Vec<Vec<&Partial>> = vec![Vec::new()];
    for (i, cache) in caches.iter().enumerate() {
        if i == slot {
            for t in &mut tuples {
                t.push(newcomer);
            }
        } else {
            if cache.is_empty() {
                return Vec::new();
            }
            let mut next = Vec::with_capacity(tuples.len() * cache.len());
            for t in &tuples {
                for cached in cache {
                    let mut t = t.clone();
                    t.push(cached);
                    next.push(t);
                }
            }
            tuples = next;
        }
    }
    tuples
        .into_iter()
        .map(|parts| {
            let mut index = Index::empty();
            for p in &parts {
                index = index.concat(&p.index);
            }
            NodeEvent::Partial(Partial::merge(index, parts.into_iter()))
        })
        .collect()
}
