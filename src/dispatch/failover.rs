//! Failover layer: walk alternative activities on failure.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dispatch::layer::{DispatchLayer, LayerContext};
use crate::dispatch::state::{StateTracker, Tracked};
use crate::model::{Completion, ErrorEvent, Index, JobEvent, ProcessId, ResultEvent};

struct FailoverState {
    index: Index,
    /// The most recently dispatched form of the job; its activity list
    /// shrinks by one on every failed alternative.
    current: Mutex<JobEvent>,
}

impl Tracked for FailoverState {
    fn index(&self) -> &Index {
        &self.index
    }
}

/// On an error for a tracked job: if the job still has an alternative
/// activity, pop the failed head and re-dispatch downward; otherwise relay
/// the error upward unmodified.
#[derive(Default)]
pub struct FailoverLayer {
    tracker: StateTracker<FailoverState>,
}

impl FailoverLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DispatchLayer for FailoverLayer {
    fn name(&self) -> &'static str {
        "failover"
    }

    async fn receive_job(&self, ctx: &LayerContext, event: JobEvent) {
        self.tracker.track(
            &event.job.process,
            Arc::new(FailoverState {
                index: event.job.index.clone(),
                current: Mutex::new(event.clone()),
            }),
        );
        ctx.send_job_down(event).await;
    }

    async fn receive_error(&self, ctx: &LayerContext, event: ErrorEvent) {
        let Some(state) = self.tracker.find(&event.process, &event.index) else {
            warn!(process = %event.process, index = %event.index,
                  "could not match error to an in-flight job; relaying");
            ctx.send_error_up(event).await;
            return;
        };
        // Snapshot the next alternative without holding the lock across
        // the downward call.
        let next = {
            let mut current = state.current.lock();
            match current.pop_activity() {
                Some(next) => {
                    *current = next.clone();
                    Some(next)
                }
                None => None,
            }
        };
        match next {
            Some(job) => {
                debug!(process = %event.process, index = %event.index,
                       remaining = job.activities.len(), "failing over to next activity");
                ctx.send_job_down(job).await;
            }
            None => {
                self.tracker.forget(&event.process, &event.index);
                ctx.send_error_up(event).await;
            }
        }
    }

    async fn receive_result(&self, ctx: &LayerContext, event: ResultEvent) {
        self.tracker.forget(&event.process, &event.index);
        ctx.send_result_up(event).await;
    }

    async fn receive_result_completion(&self, ctx: &LayerContext, event: Completion) {
        self.tracker.forget(&event.process, &event.index);
        ctx.send_completion_up(event).await;
    }

    fn finished_with(&self, process: &ProcessId) {
        self.tracker.clear(process);
    }
}
