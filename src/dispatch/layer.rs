//! The dispatch layer interface and its routing context.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::stack::{DispatchStack, JobQueue};
use crate::model::{Completion, ErrorEvent, JobEvent, ProcessId, ResultEvent};

/// First delivery of a per-process queue to the top layer.
#[derive(Clone)]
pub struct JobQueueEvent {
    pub process: ProcessId,
    pub queue: Arc<JobQueue>,
}

/// Routing context handed to a layer with every delivery.
///
/// Neighbors are resolved by stack position at call time — layers never
/// store pointers to each other, so the layer list can be mutated between
/// runs. The context is cheap to clone and owned clones can outlive the
/// delivering call (retry timers, invocation tasks).
#[derive(Clone)]
pub struct LayerContext {
    stack: DispatchStack,
    position: usize,
}

impl LayerContext {
    pub(crate) fn new(stack: DispatchStack, position: usize) -> Self {
        Self { stack, position }
    }

    pub fn stack(&self) -> &DispatchStack {
        &self.stack
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Deliver a job to the layer below, or log the anomaly if this is the
    /// bottom of the stack.
    pub async fn send_job_down(&self, event: JobEvent) {
        match self.stack.layer_at(self.position + 1) {
            Some(layer) => {
                let ctx = LayerContext::new(self.stack.clone(), self.position + 1);
                layer.receive_job(&ctx, event).await;
            }
            None => self
                .stack
                .dropped_off_bottom("job", &event.job.process),
        }
    }

    /// Deliver a queue event to the layer below.
    pub async fn send_queue_down(&self, event: JobQueueEvent) {
        match self.stack.layer_at(self.position + 1) {
            Some(layer) => {
                let ctx = LayerContext::new(self.stack.clone(), self.position + 1);
                layer.receive_job_queue(&ctx, event).await;
            }
            None => self.stack.dropped_off_bottom("job queue", &event.process),
        }
    }

    /// Deliver a result to the layer above, or to the stack terminal when
    /// this is the top layer.
    pub async fn send_result_up(&self, event: ResultEvent) {
        if self.position == 0 {
            self.stack.terminal_result(event).await;
        } else if let Some(layer) = self.stack.layer_at(self.position - 1) {
            let ctx = LayerContext::new(self.stack.clone(), self.position - 1);
            layer.receive_result(&ctx, event).await;
        }
    }

    pub async fn send_error_up(&self, event: ErrorEvent) {
        if self.position == 0 {
            self.stack.terminal_error(event).await;
        } else if let Some(layer) = self.stack.layer_at(self.position - 1) {
            let ctx = LayerContext::new(self.stack.clone(), self.position - 1);
            layer.receive_error(&ctx, event).await;
        }
    }

    pub async fn send_completion_up(&self, event: Completion) {
        if self.position == 0 {
            self.stack.terminal_completion(event).await;
        } else if let Some(layer) = self.stack.layer_at(self.position - 1) {
            let ctx = LayerContext::new(self.stack.clone(), self.position - 1);
            layer.receive_result_completion(&ctx, event).await;
        }
    }
}

/// One policy unit in the dispatch stack.
///
/// Four of the six operations default to pass-through: jobs and queue
/// events continue downward, results/errors/completions continue upward.
/// Concrete layers override selectively. `finished_with` is the per-process
/// purge hook for layers that keep caches.
#[async_trait]
pub trait DispatchLayer: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    async fn receive_job(&self, ctx: &LayerContext, event: JobEvent) {
        ctx.send_job_down(event).await;
    }

    async fn receive_job_queue(&self, ctx: &LayerContext, event: JobQueueEvent) {
        ctx.send_queue_down(event).await;
    }

    async fn receive_result(&self, ctx: &LayerContext, event: ResultEvent) {
        ctx.send_result_up(event).await;
    }

    async fn receive_error(&self, ctx: &LayerContext, event: ErrorEvent) {
        ctx.send_error_up(event).await;
    }

    async fn receive_result_completion(&self, ctx: &LayerContext, event: Completion) {
        ctx.send_completion_up(event).await;
    }

    /// Purge all per-process state. Default: nothing to purge.
    fn finished_with(&self, _process: &ProcessId) {}
}
