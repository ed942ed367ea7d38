//! Parallelism-limiting layer: the queue consumer at the top of a stack.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::dispatch::layer::{DispatchLayer, JobQueueEvent, LayerContext};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{Completion, DispatchEvent, ErrorEvent, ProcessId, ResultEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelizeConfig {
    /// Maximum number of jobs in flight below this layer, per owning
    /// process.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

fn default_max_jobs() -> usize {
    1
}

impl Default for ParallelizeConfig {
    fn default() -> Self {
        Self {
            max_jobs: default_max_jobs(),
        }
    }
}

impl ParallelizeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_jobs == 0 {
            return Err(ConfigError::InvalidParallelizeConfig(format!(
                "max_jobs must be >= 1, got {}",
                self.max_jobs
            )));
        }
        Ok(())
    }
}

struct PumpState {
    semaphore: Arc<Semaphore>,
    in_flight: AtomicUsize,
    /// Completions popped from the queue while jobs are still in flight,
    /// forwarded in arrival order once the stream drains.
    completions: Mutex<VecDeque<Completion>>,
    abort: Mutex<Option<AbortHandle>>,
}

/// Consumes the per-process queue, dispatching jobs downward while keeping
/// at most `max_jobs` of them in flight. Queue completions are stashed in
/// arrival order and travel upward as result-completions only once every
/// dispatched job has come back (as a result or an error).
pub struct ParallelizeLayer {
    config: ParallelizeConfig,
    pumps: DashMap<ProcessId, Arc<PumpState>>,
}

impl ParallelizeLayer {
    pub fn new(config: ParallelizeConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pumps: DashMap::new(),
        })
    }

    /// One job came back; release its permit and finish the stream if a
    /// completion has arrived and nothing is left in flight.
    ///
    /// A return event with no job in flight (a duplicate result or error
    /// for an already-settled index) is logged and ignored; it must never
    /// drive the counter below zero.
    async fn job_returned(&self, ctx: &LayerContext, process: &ProcessId) {
        let Some(pump) = self.pumps.get(process).map(|p| Arc::clone(&p)) else {
            return;
        };
        if pump
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            warn!(process = %process, "return event with no job in flight; ignored");
            return;
        }
        pump.semaphore.add_permits(1);
        Self::maybe_complete(&pump, ctx).await;
    }

    async fn maybe_complete(pump: &PumpState, ctx: &LayerContext) {
        loop {
            let completion = {
                let mut stash = pump.completions.lock();
                if pump.in_flight.load(Ordering::SeqCst) == 0 {
                    stash.pop_front()
                } else {
                    None
                }
            };
            match completion {
                Some(c) => ctx.send_completion_up(c).await,
                None => break,
            }
        }
    }
}

#[async_trait]
impl DispatchLayer for ParallelizeLayer {
    fn name(&self) -> &'static str {
        "parallelize"
    }

    async fn receive_job_queue(&self, ctx: &LayerContext, event: JobQueueEvent) {
        let pump = Arc::new(PumpState {
            semaphore: Arc::new(Semaphore::new(self.config.max_jobs)),
            in_flight: AtomicUsize::new(0),
            completions: Mutex::new(VecDeque::new()),
            abort: Mutex::new(None),
        });
        if self
            .pumps
            .insert(event.process.clone(), Arc::clone(&pump))
            .is_some()
        {
            warn!(process = %event.process, "duplicate queue delivery; replacing pump");
        }

        let ctx = ctx.clone();
        let task_pump = Arc::clone(&pump);
        let handle = tokio::spawn(async move {
            loop {
                match event.queue.pop() {
                    Some(DispatchEvent::Job(job)) => {
                        match Arc::clone(&task_pump.semaphore).acquire_owned().await {
                            Ok(permit) => permit.forget(),
                            Err(_) => break,
                        }
                        task_pump.in_flight.fetch_add(1, Ordering::SeqCst);
                        ctx.send_job_down(job).await;
                    }
                    Some(DispatchEvent::Completion(c)) => {
                        let done = c.is_final();
                        task_pump.completions.lock().push_back(c);
                        Self::maybe_complete(&task_pump, &ctx).await;
                        if done {
                            break;
                        }
                    }
                    None => event.queue.wait_for_push().await,
                }
            }
        });
        *pump.abort.lock() = Some(handle.abort_handle());
        debug!(process = %event.process, max_jobs = self.config.max_jobs, "queue pump started");
    }

    async fn receive_result(&self, ctx: &LayerContext, event: ResultEvent) {
        let process = event.process.clone();
        ctx.send_result_up(event).await;
        self.job_returned(ctx, &process).await;
    }

    async fn receive_error(&self, ctx: &LayerContext, event: ErrorEvent) {
        let process = event.process.clone();
        ctx.send_error_up(event).await;
        self.job_returned(ctx, &process).await;
    }

    fn finished_with(&self, process: &ProcessId) {
        if let Some((_, pump)) = self.pumps.remove(process) {
            if let Some(handle) = pump.abort.lock().take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(ParallelizeConfig::default().validate().is_ok());
        assert!(ParallelizeConfig { max_jobs: 0 }.validate().is_err());
        assert!(ParallelizeLayer::new(ParallelizeConfig { max_jobs: 0 }).is_err());
    }

    #[test]
    fn test_serde_default() {
        let c: ParallelizeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c.max_jobs, 1);
    }
}
