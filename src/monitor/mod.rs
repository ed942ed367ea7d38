//! Process monitor tree.
//!
//! A shared registry of live invocation nodes keyed by owning-process path.
//! Steps register a node when their first event arrives and deregister it on
//! terminal cleanup; removal is delayed by a configurable grace period so
//! observers can still read the terminal state. Lookups fail cleanly
//! (`None`) when a segment is unknown — deregistration legitimately races
//! with removal timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{ProcessId, RealTimeProvider, TimeProvider};

/// Registration/deregistration messages, for callers that prefer to feed
/// the monitor over a channel instead of holding a handle.
#[derive(Debug)]
pub enum MonitorMessage {
    Register {
        process: ProcessId,
        properties: HashMap<String, Value>,
    },
    SetProperty {
        process: ProcessId,
        key: String,
        value: Value,
    },
    Deregister {
        process: ProcessId,
    },
}

struct MonitorNode {
    registered_at_millis: i64,
    expiring: AtomicBool,
    properties: RwLock<HashMap<String, Value>>,
}

/// Read-only view of one monitor node.
#[derive(Debug, Clone)]
pub struct MonitorNodeSnapshot {
    pub registered_at: DateTime<Utc>,
    pub expiring: bool,
    pub properties: HashMap<String, Value>,
}

/// Tree of live invocation nodes, keyed by owning-process path.
pub struct ProcessMonitor {
    nodes: DashMap<ProcessId, MonitorNode>,
    removal_delay: Duration,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProcessMonitor {
    pub fn new(removal_delay: Duration) -> Self {
        Self::with_time_provider(removal_delay, Arc::new(RealTimeProvider))
    }

    pub fn with_time_provider(
        removal_delay: Duration,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            nodes: DashMap::new(),
            removal_delay,
            time_provider,
        }
    }

    /// Register a node. Parent segments need not be registered first; the
    /// tree structure is implied by the path convention.
    pub fn register(&self, process: ProcessId, properties: HashMap<String, Value>) {
        debug!(process = %process, "monitor node registered");
        self.nodes.insert(
            process,
            MonitorNode {
                registered_at_millis: self.time_provider.now_millis(),
                expiring: AtomicBool::new(false),
                properties: RwLock::new(properties),
            },
        );
    }

    /// Update one property on a live node. Returns false when the node is
    /// unknown (already removed or never registered).
    pub fn set_property(&self, process: &ProcessId, key: impl Into<String>, value: Value) -> bool {
        match self.nodes.get(process) {
            Some(node) => {
                node.properties.write().insert(key.into(), value);
                true
            }
            None => false,
        }
    }

    /// Look up a node by full path. `None` when any segment is unknown.
    pub fn lookup(&self, process: &ProcessId) -> Option<MonitorNodeSnapshot> {
        self.nodes.get(process).map(|node| MonitorNodeSnapshot {
            registered_at: DateTime::from_timestamp_millis(node.registered_at_millis)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            expiring: node.expiring.load(Ordering::SeqCst),
            properties: node.properties.read().clone(),
        })
    }

    /// Direct children of `process` currently registered.
    pub fn children(&self, process: &ProcessId) -> Vec<ProcessId> {
        let child_depth = process.depth() + 1;
        self.nodes
            .iter()
            .map(|e| e.key().clone())
            .filter(|p| p.depth() == child_depth && p.starts_with(process))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Schedule removal of a node and its descendants after the configured
    /// delay. The node stays visible (flagged `expiring`) until the timer
    /// fires.
    pub fn deregister(self: &Arc<Self>, process: &ProcessId) {
        match self.nodes.get(process) {
            Some(node) => {
                if node.expiring.swap(true, Ordering::SeqCst) {
                    return;
                }
            }
            None => {
                warn!(process = %process, "deregister for unknown monitor node");
                return;
            }
        }
        debug!(process = %process, delay_ms = self.removal_delay.as_millis() as u64,
               "monitor node removal scheduled");
        let monitor = Arc::clone(self);
        let process = process.clone();
        tokio::spawn(async move {
            tokio::time::sleep(monitor.removal_delay).await;
            monitor.remove_subtree(&process);
        });
    }

    fn remove_subtree(&self, process: &ProcessId) {
        let doomed: Vec<ProcessId> = self
            .nodes
            .iter()
            .map(|e| e.key().clone())
            .filter(|p| p.starts_with(process))
            .collect();
        for p in doomed {
            self.nodes.remove(&p);
        }
        debug!(process = %process, "monitor subtree removed");
    }

    /// Channel front end: spawns a consumer task and returns its sender.
    pub fn message_sender(self: &Arc<Self>) -> mpsc::UnboundedSender<MonitorMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    MonitorMessage::Register {
                        process,
                        properties,
                    } => monitor.register(process, properties),
                    MonitorMessage::SetProperty {
                        process,
                        key,
                        value,
                    } => {
                        monitor.set_property(&process, key, value);
                    }
                    MonitorMessage::Deregister { process } => monitor.deregister(&process),
                }
            }
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FakeTimeProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_lookup_children() {
        let monitor = ProcessMonitor::new(Duration::from_secs(1));
        let run = ProcessId::new("wf");
        let a = run.push("a");
        let b = run.push("b");
        let nested = a.push("inner");

        monitor.register(run.clone(), HashMap::new());
        monitor.register(a.clone(), HashMap::from([("state".into(), json!("running"))]));
        monitor.register(b.clone(), HashMap::new());
        monitor.register(nested.clone(), HashMap::new());

        let snap = monitor.lookup(&a).unwrap();
        assert_eq!(snap.properties["state"], json!("running"));

        let mut kids = monitor.children(&run);
        kids.sort();
        assert_eq!(kids, vec![a.clone(), b]);
        assert_eq!(monitor.children(&a), vec![nested]);
        assert!(monitor.lookup(&run.push("missing")).is_none());
    }

    #[tokio::test]
    async fn test_registration_timestamp_comes_from_time_provider() {
        let clock = Arc::new(FakeTimeProvider::new(1_700_000_000_000));
        let monitor =
            ProcessMonitor::with_time_provider(Duration::from_secs(1), clock.clone());
        let p = ProcessId::new("wf").push("timed");
        monitor.register(p.clone(), HashMap::new());

        let snap = monitor.lookup(&p).unwrap();
        assert_eq!(snap.registered_at.timestamp_millis(), 1_700_000_000_000);

        clock.advance_millis(5_000);
        let later = ProcessId::new("wf").push("later");
        monitor.register(later.clone(), HashMap::new());
        assert_eq!(
            monitor.lookup(&later).unwrap().registered_at.timestamp_millis(),
            1_700_000_005_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_removal_keeps_terminal_state_visible() {
        let monitor = Arc::new(ProcessMonitor::new(Duration::from_millis(500)));
        let step = ProcessId::new("wf").push("step");
        let nested = step.push("inner");
        monitor.register(step.clone(), HashMap::new());
        monitor.register(nested.clone(), HashMap::new());

        monitor.deregister(&step);
        // Still visible before the grace period elapses.
        let snap = monitor.lookup(&step).unwrap();
        assert!(snap.expiring);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(monitor.lookup(&step).is_none());
        assert!(monitor.lookup(&nested).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregister_is_idempotent_and_tolerates_unknown() {
        let monitor = Arc::new(ProcessMonitor::new(Duration::from_millis(100)));
        let p = ProcessId::new("wf").push("x");
        monitor.register(p.clone(), HashMap::new());
        monitor.deregister(&p);
        monitor.deregister(&p);
        monitor.deregister(&ProcessId::new("never-registered"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(monitor.is_empty());
    }

    #[tokio::test]
    async fn test_message_front() {
        let monitor = Arc::new(ProcessMonitor::new(Duration::from_millis(10)));
        let tx = monitor.message_sender();
        let p = ProcessId::new("wf").push("msg");
        tx.send(MonitorMessage::Register {
            process: p.clone(),
            properties: HashMap::new(),
        })
        .unwrap();
        tx.send(MonitorMessage::SetProperty {
            process: p.clone(),
            key: "state".into(),
            value: json!("done"),
        })
        .unwrap();
        // Consumer runs on the same runtime; yield until it drains both
        // messages.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if monitor
                .lookup(&p)
                .is_some_and(|s| s.properties.contains_key("state"))
            {
                break;
            }
        }
        let snap = monitor.lookup(&p).unwrap();
        assert_eq!(snap.properties["state"], json!("done"));
    }
}
