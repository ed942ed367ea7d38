//! Shared test activities and layers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokenflow::{
    Activity, ActivityError, DispatchEvent, DispatchLayer, InvocationContext, JobEvent,
    JobQueueEvent, LayerContext, ValueRef,
};

/// Canonical key for one input map: sorted `port=ref` pairs.
pub fn input_key(inputs: &HashMap<String, ValueRef>) -> String {
    let mut pairs: Vec<String> = inputs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// Activity that fails a scripted number of times per distinct input set,
/// then succeeds with a single `out` reference derived from the inputs.
pub struct ScriptedActivity {
    name: &'static str,
    failures: Mutex<HashMap<String, usize>>,
    pub calls: AtomicUsize,
}

impl ScriptedActivity {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make the invocation matching `key` fail `times` times before
    /// succeeding.
    pub fn fail_times(self, key: impl Into<String>, times: usize) -> Self {
        self.failures.lock().insert(key.into(), times);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for ScriptedActivity {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(
        &self,
        inputs: &HashMap<String, ValueRef>,
        _context: &InvocationContext,
    ) -> Result<HashMap<String, ValueRef>, ActivityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = input_key(inputs);
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ActivityError::Failed(format!("scripted failure for {key}")));
                }
            }
        }
        Ok(HashMap::from([(
            "out".to_string(),
            ValueRef::new(format!("out({key})")),
        )]))
    }
}

/// Activity that always fails.
pub struct AlwaysFail {
    pub calls: AtomicUsize,
}

impl AlwaysFail {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for AlwaysFail {
    fn name(&self) -> &str {
        "always-fail"
    }

    async fn invoke(
        &self,
        _inputs: &HashMap<String, ValueRef>,
        _context: &InvocationContext,
    ) -> Result<HashMap<String, ValueRef>, ActivityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ActivityError::Failed("deliberate failure".into()))
    }
}

/// Activity that sleeps and records peak concurrency.
pub struct SleepProbe {
    pub current: AtomicUsize,
    pub max_seen: AtomicUsize,
    pub sleep_ms: u64,
}

impl SleepProbe {
    pub fn new(sleep_ms: u64) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            sleep_ms,
        }
    }

    pub fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for SleepProbe {
    fn name(&self) -> &str {
        "sleep-probe"
    }

    async fn invoke(
        &self,
        inputs: &HashMap<String, ValueRef>,
        _context: &InvocationContext,
    ) -> Result<HashMap<String, ValueRef>, ActivityError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(self.sleep_ms)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(HashMap::from([(
            "out".to_string(),
            ValueRef::new(format!("out({})", input_key(inputs))),
        )]))
    }
}

/// Top layer for hand-built stacks: pumps the per-process queue downward.
pub struct DrainTop;

#[async_trait]
impl DispatchLayer for DrainTop {
    fn name(&self) -> &'static str {
        "drain-top"
    }

    async fn receive_job_queue(&self, ctx: &LayerContext, event: JobQueueEvent) {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            loop {
                match event.queue.pop() {
                    Some(DispatchEvent::Job(job)) => ctx.send_job_down(job).await,
                    Some(DispatchEvent::Completion(c)) => {
                        let done = c.is_final();
                        ctx.send_completion_up(c).await;
                        if done {
                            break;
                        }
                    }
                    None => event.queue.wait_for_push().await,
                }
            }
        });
    }
}

/// Bottom layer that captures jobs and their routing context so a test can
/// inject results and errors by hand.
#[derive(Default)]
pub struct CaptureBottom {
    pub seen: Mutex<Vec<(LayerContext, JobEvent)>>,
}

#[async_trait]
impl DispatchLayer for CaptureBottom {
    fn name(&self) -> &'static str {
        "capture-bottom"
    }

    async fn receive_job(&self, ctx: &LayerContext, event: JobEvent) {
        self.seen.lock().push((ctx.clone(), event));
    }
}
