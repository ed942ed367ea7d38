//! Invocation layer: the bottom of every stack.

use async_trait::async_trait;
use tracing::trace;

use crate::activity::ActivityError;
use crate::dispatch::layer::{DispatchLayer, LayerContext};
use crate::model::{ErrorEvent, JobEvent, ResultEvent};

/// Hands each job to the head of its candidate activity list and converts
/// the outcome into an upward result or error.
///
/// Invocation runs on a spawned task, so results and errors re-enter the
/// stack asynchronously rather than deep inside the downward call chain.
#[derive(Default)]
pub struct InvokeLayer;

impl InvokeLayer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DispatchLayer for InvokeLayer {
    fn name(&self) -> &'static str {
        "invoke"
    }

    async fn receive_job(&self, ctx: &LayerContext, event: JobEvent) {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let process = event.job.process.clone();
            let index = event.job.index.clone();
            let Some(activity) = event.activities.first().cloned() else {
                ctx.send_error_up(ErrorEvent::new(
                    process,
                    index,
                    "no activity available for invocation",
                ))
                .await;
                return;
            };
            trace!(process = %process, index = %index, activity = activity.name(),
                   "invoking activity");
            match activity.invoke(&event.job.inputs, &event.job.context).await {
                Ok(outputs) => {
                    ctx.send_result_up(ResultEvent {
                        process,
                        index,
                        outputs,
                    })
                    .await;
                }
                Err(ActivityError::Failed(message)) => {
                    ctx.send_error_up(ErrorEvent::new(process, index, message)).await;
                }
                Err(ActivityError::FailedWithCause { message, cause }) => {
                    ctx.send_error_up(
                        ErrorEvent::new(process, index, message).with_cause(cause),
                    )
                    .await;
                }
            }
        });
    }
}
