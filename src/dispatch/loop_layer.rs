//! Conditional-loop layer: re-invoke while a condition activity says so.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::activity::Activity;
use crate::dispatch::layer::{DispatchLayer, LayerContext};
use crate::dispatch::state::{StateTracker, Tracked};
use crate::model::{Completion, ErrorEvent, Index, JobEvent, ProcessId, ResultEvent};

/// Loop configuration.
///
/// The condition activity's `loop` output port must resolve to the literal
/// `true` for the job to be (re-)dispatched. `run_first` decides whether
/// the main invocation runs before the condition is first consulted.
#[derive(Clone)]
pub struct LoopConfig {
    pub condition: Option<Arc<dyn Activity>>,
    pub run_first: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            condition: None,
            run_first: true,
        }
    }
}

struct LoopState {
    event: JobEvent,
}

impl Tracked for LoopState {
    fn index(&self) -> &Index {
        &self.event.job.index
    }
}

/// Repeats a job while its condition holds.
///
/// Without a condition the layer is pure pass-through. With one, every
/// result is fed (together with the original inputs) to the condition
/// activity; a `loop=true` output re-submits the original job downward and
/// swallows the result.
pub struct LoopLayer {
    config: LoopConfig,
    tracker: StateTracker<LoopState>,
}

impl LoopLayer {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            tracker: StateTracker::default(),
        }
    }

    /// Run the condition activity; `Ok(true)` means iterate (again).
    async fn should_loop(&self, condition: &Arc<dyn Activity>, event: &JobEvent) -> Result<bool, ErrorEvent> {
        match condition
            .invoke(&event.job.inputs, &event.job.context)
            .await
        {
            Ok(outputs) => Ok(outputs
                .get("loop")
                .map(|v| v.is_literal_true())
                .unwrap_or(false)),
            Err(e) => Err(ErrorEvent::new(
                event.job.process.clone(),
                event.job.index.clone(),
                format!("loop condition failed: {}", e.message()),
            )),
        }
    }
}

#[async_trait]
impl DispatchLayer for LoopLayer {
    fn name(&self) -> &'static str {
        "loop"
    }

    async fn receive_job(&self, ctx: &LayerContext, event: JobEvent) {
        let Some(condition) = self.config.condition.clone() else {
            ctx.send_job_down(event).await;
            return;
        };
        if !self.config.run_first {
            match self.should_loop(&condition, &event).await {
                Ok(true) => {}
                Ok(false) => {
                    // Condition false before the first run: reflect the
                    // inputs as a pass-through result.
                    debug!(process = %event.job.process, index = %event.job.index,
                           "loop condition false before first run");
                    ctx.send_result_up(ResultEvent {
                        process: event.job.process.clone(),
                        index: event.job.index.clone(),
                        outputs: event.job.inputs.clone(),
                    })
                    .await;
                    return;
                }
                Err(error) => {
                    ctx.send_error_up(error).await;
                    return;
                }
            }
        }
        self.tracker.track(
            &event.job.process,
            Arc::new(LoopState {
                event: event.clone(),
            }),
        );
        ctx.send_job_down(event).await;
    }

    async fn receive_result(&self, ctx: &LayerContext, event: ResultEvent) {
        let Some(condition) = self.config.condition.clone() else {
            ctx.send_result_up(event).await;
            return;
        };
        let Some(state) = self.tracker.find(&event.process, &event.index) else {
            warn!(process = %event.process, index = %event.index,
                  "result without tracked loop state; relaying");
            ctx.send_result_up(event).await;
            return;
        };
        // Feed the condition the original inputs extended by this
        // iteration's outputs.
        let probe = JobEvent::new(state.event.job.with_inputs(&event.outputs), state.event.activities.clone());
        match self.should_loop(&condition, &probe).await {
            Ok(true) => {
                debug!(process = %event.process, index = %event.index, "loop condition true; re-invoking");
                ctx.send_job_down(state.event.clone()).await;
            }
            Ok(false) => {
                self.tracker.forget(&event.process, &event.index);
                ctx.send_result_up(event).await;
            }
            Err(error) => {
                self.tracker.forget(&event.process, &event.index);
                ctx.send_error_up(error).await;
            }
        }
    }

    async fn receive_error(&self, ctx: &LayerContext, event: ErrorEvent) {
        self.tracker.forget(&event.process, &event.index);
        ctx.send_error_up(event).await;
    }

    async fn receive_result_completion(&self, ctx: &LayerContext, event: Completion) {
        self.tracker.forget(&event.process, &event.index);
        ctx.send_completion_up(event).await;
    }

    fn finished_with(&self, process: &ProcessId) {
        self.tracker.clear(process);
    }
}
