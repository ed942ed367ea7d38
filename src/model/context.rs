//! Execution context threaded through jobs.
//!
//! Provides time and ID generation behind traits so tests can substitute
//! deterministic fakes instead of sleeping or parsing generated IDs.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::monitor::ProcessMonitor;

/// Cloneable execution context carried by every [`Job`](crate::model::Job).
#[derive(Clone)]
pub struct InvocationContext {
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub monitor: Option<Arc<ProcessMonitor>>,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self {
            time_provider: Arc::new(RealTimeProvider),
            id_generator: Arc::new(RealIdGenerator),
            monitor: None,
        }
    }
}

impl InvocationContext {
    pub fn with_monitor(mut self, monitor: Arc<ProcessMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

pub trait TimeProvider: Send + Sync {
    fn now_timestamp(&self) -> i64;
    fn now_millis(&self) -> i64;
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

// --- Real implementations ---

pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now_timestamp(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

pub struct RealIdGenerator;

impl IdGenerator for RealIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// --- Fake implementations ---

pub struct FakeTimeProvider {
    millis: AtomicI64,
}

impl FakeTimeProvider {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn advance_millis(&self, by: i64) {
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl TimeProvider for FakeTimeProvider {
    fn now_timestamp(&self) -> i64 {
        self.millis.load(Ordering::SeqCst) / 1000
    }

    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

pub struct FakeIdGenerator {
    pub prefix: String,
    counter: AtomicU64,
}

impl FakeIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for FakeIdGenerator {
    fn next_id(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_time_advances() {
        let t = FakeTimeProvider::new(1_000);
        assert_eq!(t.now_millis(), 1_000);
        t.advance_millis(2_500);
        assert_eq!(t.now_millis(), 3_500);
        assert_eq!(t.now_timestamp(), 3);
    }

    #[test]
    fn test_fake_ids_are_sequential() {
        let g = FakeIdGenerator::new("inv");
        assert_eq!(g.next_id(), "inv-0");
        assert_eq!(g.next_id(), "inv-1");
    }
}
