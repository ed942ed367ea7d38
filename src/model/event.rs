//! Events exchanged between dispatch layers.
//!
//! Jobs and completions travel down the stack; results, errors and result
//! completions travel back up. All addressing fields (process, index) are
//! immutable after construction — derived events copy-extend rather than
//! mutate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::activity::ActivityList;
use crate::model::{Index, InvocationContext, ProcessId, ValueRef};

/// One fully-combined invocation unit, ready for dispatch.
#[derive(Debug, Clone)]
pub struct Job {
    pub process: ProcessId,
    pub index: Index,
    pub inputs: HashMap<String, ValueRef>,
    pub context: InvocationContext,
}

impl Job {
    pub fn new(
        process: ProcessId,
        index: Index,
        inputs: HashMap<String, ValueRef>,
        context: InvocationContext,
    ) -> Self {
        Self {
            process,
            index,
            inputs,
            context,
        }
    }

    /// A copy of this job with `extra` entries merged over its input map.
    pub fn with_inputs(&self, extra: &HashMap<String, ValueRef>) -> Job {
        let mut inputs = self.inputs.clone();
        inputs.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Job {
            process: self.process.clone(),
            index: self.index.clone(),
            inputs,
            context: self.context.clone(),
        }
    }
}

/// Downward-travelling dispatch unit: a job plus its candidate activities.
///
/// The activity list is ordered; the invoke layer uses the head, the
/// failover layer pops it when an alternative fails.
#[derive(Clone)]
pub struct JobEvent {
    pub job: Job,
    pub activities: ActivityList,
}

impl JobEvent {
    pub fn new(job: Job, activities: ActivityList) -> Self {
        Self { job, activities }
    }

    /// This event with the first (failed) activity removed, or `None` when
    /// no alternative remains.
    pub fn pop_activity(&self) -> Option<JobEvent> {
        if self.activities.len() > 1 {
            Some(JobEvent {
                job: self.job.clone(),
                activities: self.activities[1..].to_vec().into(),
            })
        } else {
            None
        }
    }
}

impl std::fmt::Debug for JobEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEvent")
            .field("job", &self.job)
            .field("activities", &self.activities.len())
            .finish()
    }
}

/// Upward-travelling result for one index.
#[derive(Debug, Clone)]
pub struct ResultEvent {
    pub process: ProcessId,
    pub index: Index,
    pub outputs: HashMap<String, ValueRef>,
}

impl ResultEvent {
    pub fn is_final(&self) -> bool {
        self.index.is_empty()
    }
}

/// Signal that no further tokens will arrive at the given index depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub process: ProcessId,
    pub index: Index,
}

impl Completion {
    pub fn final_for(process: ProcessId) -> Self {
        Self {
            process,
            index: Index::empty(),
        }
    }

    /// Final completions terminate the entire stream for the process.
    pub fn is_final(&self) -> bool {
        self.index.is_empty()
    }
}

/// Failure to produce a value at a given index.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub process: ProcessId,
    pub index: Index,
    pub message: String,
    pub cause: Option<Arc<anyhow::Error>>,
}

impl ErrorEvent {
    pub fn new(process: ProcessId, index: Index, message: impl Into<String>) -> Self {
        Self {
            process,
            index,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }
}

/// Queueable item: what enters a dispatch stack from the iteration strategy.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Job(JobEvent),
    Completion(Completion),
}

impl DispatchEvent {
    pub fn process(&self) -> &ProcessId {
        match self {
            DispatchEvent::Job(e) => &e.job.process,
            DispatchEvent::Completion(c) => &c.process,
        }
    }
}
