//! Retry layer: delayed re-submission with exponential backoff.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::layer::{DispatchLayer, LayerContext};
use crate::dispatch::state::{StateTracker, Tracked};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{Completion, ErrorEvent, Index, JobEvent, ProcessId, ResultEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: i32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_backoff_factor() -> f64 {
    1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries < 0 {
            return Err(ConfigError::InvalidRetryConfig(format!(
                "max_retries must be >= 0, got {}",
                self.max_retries
            )));
        }
        if self.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidRetryConfig(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    /// Delay before re-submission number `attempt` (0-based):
    /// `min(max_delay, initial_delay * backoff_factor^attempt)`.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let scaled = self.initial_delay_ms as f64 * self.backoff_factor.powi(attempt);
        Duration::from_millis((scaled as u64).min(self.max_delay_ms))
    }
}

struct RetryState {
    event: JobEvent,
    attempts: AtomicI32,
}

impl Tracked for RetryState {
    fn index(&self) -> &Index {
        &self.event.job.index
    }
}

/// Intercepts errors for in-flight jobs and re-submits them downward after
/// an exponentially growing delay, up to `max_retries` times. Results and
/// completions forget the matching state on their way up.
pub struct RetryLayer {
    config: RetryConfig,
    tracker: StateTracker<RetryState>,
}

impl RetryLayer {
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tracker: StateTracker::default(),
        })
    }
}

#[async_trait]
impl DispatchLayer for RetryLayer {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn receive_job(&self, ctx: &LayerContext, event: JobEvent) {
        self.tracker.track(
            &event.job.process,
            Arc::new(RetryState {
                event: event.clone(),
                attempts: AtomicI32::new(0),
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
        let attempt = state.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.config.max_retries {
            let delay = self.config.delay_for_attempt(attempt);
            debug!(process = %event.process, index = %event.index, attempt,
                   delay_ms = delay.as_millis() as u64, "scheduling retry");
            let ctx = ctx.clone();
            let job = state.event.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                ctx.send_job_down(job).await;
            });
        } else {
            debug!(process = %event.process, index = %event.index,
                   attempts = attempt, "retries exhausted; relaying error");
            self.tracker.forget(&event.process, &event.index);
            ctx.send_error_up(event).await;
        }
    }

    async fn receive_result(&self, ctx: &LayerContext, event: ResultEvent) {
        if self.tracker.forget(&event.process, &event.index).is_none() {
            debug!(process = %event.process, index = %event.index,
                   "could not forget retry state for result");
        }
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
