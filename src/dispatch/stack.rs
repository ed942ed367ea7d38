//! The dispatch stack: ordered layer list, per-process queues,
//! precondition gating, terminal routing and exactly-once cleanup.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::dispatch::layer::{DispatchLayer, JobQueueEvent, LayerContext};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{Completion, DispatchEvent, ErrorEvent, ProcessId, ResultEvent};
use crate::monitor::ProcessMonitor;

/// FIFO queue of dispatch events for one owning process.
///
/// Pushes wake a single waiting consumer; the queue-consuming layer holds
/// the only pop side.
pub struct JobQueue {
    items: Mutex<VecDeque<DispatchEvent>>,
    notify: Notify,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, event: DispatchEvent) {
        self.items.lock().push_back(event);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<DispatchEvent> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wait until a push may have made an item available.
    pub async fn wait_for_push(&self) {
        self.notify.notified().await;
    }
}

/// Caller-supplied precondition check gating first delivery of a queue.
///
/// `enclosing` is the owning process with its last segment stripped
/// (`None` for root processes).
pub trait DispatchConditions: Send + Sync {
    fn conditions_satisfied(&self, enclosing: Option<&ProcessId>) -> bool;
}

/// Preconditions that always hold.
pub struct AlwaysSatisfied;

impl DispatchConditions for AlwaysSatisfied {
    fn conditions_satisfied(&self, _enclosing: Option<&ProcessId>) -> bool {
        true
    }
}

/// Events surfaced at the top of the stack.
#[derive(Debug)]
pub enum StackOutput {
    Result(ResultEvent),
    Completion(Completion),
    Error(ErrorEvent),
}

type CleanupHook = Box<dyn Fn(&ProcessId) + Send + Sync>;

struct QueueEntry {
    queue: Arc<JobQueue>,
    delivered: AtomicBool,
}

struct StackInner {
    name: String,
    layers: RwLock<Vec<Arc<dyn DispatchLayer>>>,
    queues: DashMap<ProcessId, QueueEntry>,
    cleaned: DashSet<ProcessId>,
    conditions: Arc<dyn DispatchConditions>,
    output_tx: mpsc::UnboundedSender<StackOutput>,
    cleanup_hook: RwLock<Option<CleanupHook>>,
    monitor: Option<Arc<ProcessMonitor>>,
}

/// Ordered container of dispatch layers for one step.
///
/// Position 0 is the top (nearest the iteration strategy); the last
/// position is the bottom (nearest invocation). A hidden terminal above
/// position 0 converts upward events into [`StackOutput`]s and drives
/// cleanup: any final (empty-index) result or completion, or any top-level
/// unhandled error, purges every layer's per-process state and deletes the
/// queue, exactly once.
#[derive(Clone)]
pub struct DispatchStack {
    inner: Arc<StackInner>,
}

impl DispatchStack {
    /// Build a stack over `layers` (top first). Returns the stack and the
    /// receiving end of its output channel.
    pub fn new(
        name: impl Into<String>,
        layers: Vec<Arc<dyn DispatchLayer>>,
        conditions: Arc<dyn DispatchConditions>,
        monitor: Option<Arc<ProcessMonitor>>,
    ) -> ConfigResult<(Self, mpsc::UnboundedReceiver<StackOutput>)> {
        if layers.is_empty() {
            return Err(ConfigError::EmptyStack);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let stack = Self {
            inner: Arc::new(StackInner {
                name: name.into(),
                layers: RwLock::new(layers),
                queues: DashMap::new(),
                cleaned: DashSet::new(),
                conditions,
                output_tx: tx,
                cleanup_hook: RwLock::new(None),
                monitor,
            }),
        };
        Ok((stack, rx))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Hook invoked once per owning process during terminal cleanup, after
    /// every layer's `finished_with`.
    pub fn set_cleanup_hook(&self, hook: impl Fn(&ProcessId) + Send + Sync + 'static) {
        *self.inner.cleanup_hook.write() = Some(Box::new(hook));
    }

    // --- layer list management ---

    pub fn layer_count(&self) -> usize {
        self.inner.layers.read().len()
    }

    pub(crate) fn layer_at(&self, position: usize) -> Option<Arc<dyn DispatchLayer>> {
        self.inner.layers.read().get(position).cloned()
    }

    /// Append a layer at the bottom.
    pub fn add_layer(&self, layer: Arc<dyn DispatchLayer>) {
        self.inner.layers.write().push(layer);
    }

    /// Insert a layer at `position` (0 = top).
    pub fn insert_layer(&self, position: usize, layer: Arc<dyn DispatchLayer>) {
        self.inner.layers.write().insert(position, layer);
    }

    /// Remove and return the layer at `position`.
    pub fn remove_layer(&self, position: usize) -> Option<Arc<dyn DispatchLayer>> {
        let mut layers = self.inner.layers.write();
        if position < layers.len() {
            Some(layers.remove(position))
        } else {
            None
        }
    }

    // --- event intake ---

    /// Accept a job or completion from the iteration strategy.
    ///
    /// Creates the per-process queue on first arrival; the queue becomes
    /// visible to the top layer (as a single job-queue event) only once the
    /// enclosing process's preconditions hold. Later arrivals append and
    /// wake the consumer.
    pub async fn receive_event(&self, event: DispatchEvent) {
        let process = event.process().clone();
        if self.inner.cleaned.contains(&process) {
            warn!(stack = %self.inner.name, process = %process,
                  "event received after cleanup; dropped");
            return;
        }

        let queue = {
            let entry = self
                .inner
                .queues
                .entry(process.clone())
                .or_insert_with(|| {
                    trace!(stack = %self.inner.name, process = %process, "queue created");
                    if let Some(monitor) = &self.inner.monitor {
                        monitor.register(process.clone(), HashMap::new());
                    }
                    QueueEntry {
                        queue: Arc::new(JobQueue::new()),
                        delivered: AtomicBool::new(false),
                    }
                });
            Arc::clone(&entry.queue)
        };

        // Cleanup may have raced the entry creation above; never resurrect.
        if self.inner.cleaned.contains(&process) {
            self.inner.queues.remove(&process);
            warn!(stack = %self.inner.name, process = %process,
                  "event raced terminal cleanup; dropped");
            return;
        }

        queue.push(event);

        if self
            .inner
            .conditions
            .conditions_satisfied(process.parent().as_ref())
        {
            self.deliver_queue(&process).await;
        }
    }

    /// Called when a previously-unsatisfied precondition for `enclosing`
    /// transitions to true. Delivers any queues already holding content;
    /// does nothing for processes with no queue yet.
    pub async fn satisfy_conditions(&self, enclosing: &ProcessId) {
        let matching: Vec<ProcessId> = self
            .inner
            .queues
            .iter()
            .map(|e| e.key().clone())
            .filter(|p| p.parent().as_ref() == Some(enclosing))
            .collect();
        for process in matching {
            self.deliver_queue(&process).await;
        }
    }

    /// Make the queue visible to the top layer, exactly once.
    async fn deliver_queue(&self, process: &ProcessId) {
        let event = {
            let Some(entry) = self.inner.queues.get(process) else {
                return;
            };
            if entry.delivered.swap(true, Ordering::SeqCst) {
                // Already visible; the push has woken the consumer.
                return;
            }
            JobQueueEvent {
                process: process.clone(),
                queue: Arc::clone(&entry.queue),
            }
        };
        debug!(stack = %self.inner.name, process = %process, "queue delivered to top layer");
        if let Some(layer) = self.layer_at(0) {
            let ctx = LayerContext::new(self.clone(), 0);
            layer.receive_job_queue(&ctx, event).await;
        }
    }

    // --- terminal (hidden layer above position 0) ---

    pub(crate) async fn terminal_result(&self, event: ResultEvent) {
        trace!(stack = %self.inner.name, process = %event.process, index = %event.index,
               "result reached top of stack");
        if event.is_final() {
            self.cleanup(&event.process.clone());
        }
        self.emit(StackOutput::Result(event));
    }

    pub(crate) async fn terminal_completion(&self, event: Completion) {
        trace!(stack = %self.inner.name, process = %event.process, index = %event.index,
               "completion reached top of stack");
        if event.is_final() {
            self.cleanup(&event.process.clone());
        }
        self.emit(StackOutput::Completion(event));
    }

    pub(crate) async fn terminal_error(&self, event: ErrorEvent) {
        warn!(stack = %self.inner.name, process = %event.process, index = %event.index,
              message = %event.message, "unhandled error reached top of stack");
        self.cleanup(&event.process.clone());
        self.emit(StackOutput::Error(event));
    }

    fn emit(&self, output: StackOutput) {
        if self.inner.output_tx.send(output).is_err() {
            trace!(stack = %self.inner.name, "output receiver dropped");
        }
    }

    pub(crate) fn dropped_off_bottom(&self, kind: &str, process: &ProcessId) {
        warn!(stack = %self.inner.name, process = %process,
              "{kind} fell off the bottom of the stack; no consuming layer installed");
    }

    // --- terminal cleanup ---

    /// Purge all per-process state. Exactly-once: repeated calls for the
    /// same process are no-ops.
    pub fn cleanup(&self, process: &ProcessId) {
        if !self.inner.cleaned.insert(process.clone()) {
            return;
        }
        debug!(stack = %self.inner.name, process = %process, "terminal cleanup");
        let layers: Vec<Arc<dyn DispatchLayer>> = self.inner.layers.read().clone();
        for layer in layers {
            layer.finished_with(process);
        }
        if let Some(hook) = self.inner.cleanup_hook.read().as_ref() {
            hook(process);
        }
        self.inner.queues.remove(process);
        if let Some(monitor) = &self.inner.monitor {
            monitor.deregister(process);
        }
    }

    /// True once terminal cleanup has run for `process`.
    pub fn is_cleaned(&self, process: &ProcessId) -> bool {
        self.inner.cleaned.contains(process)
    }

    /// Number of live per-process queues.
    pub fn live_queues(&self) -> usize {
        self.inner.queues.len()
    }
}
