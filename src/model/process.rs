//! Owning-process identifiers.
//!
//! Every value stream in the engine belongs to exactly one logical
//! invocation context, addressed by a colon-joined path of step names rooted
//! at the workflow run, e.g. `wf17:fetch:transform`. The textual convention
//! is a hard contract: the dispatch stack derives the enclosing process by
//! stripping the last segment.

use std::fmt;
use std::sync::Arc;

/// Hierarchical identifier of one logical invocation context.
///
/// Cheap to clone (shared backing string); equality and hashing are
/// structural over the full path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(Arc<str>);

impl ProcessId {
    /// Create a root identifier from a single segment.
    pub fn new(root: impl AsRef<str>) -> Self {
        Self(Arc::from(root.as_ref()))
    }

    /// Extend the path with a child segment.
    pub fn push(&self, segment: &str) -> Self {
        Self(Arc::from(format!("{}:{}", self.0, segment)))
    }

    /// The enclosing process: the path with its last segment stripped.
    ///
    /// Returns `None` for a root (single-segment) identifier.
    pub fn parent(&self) -> Option<ProcessId> {
        self.0.rfind(':').map(|at| Self(Arc::from(&self.0[..at])))
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        self.0.split(':').count()
    }

    /// True if `self` is `other` or a descendant of `other`.
    pub fn starts_with(&self, other: &ProcessId) -> bool {
        self.0 == other.0
            || (self.0.len() > other.0.len()
                && self.0.starts_with(&*other.0)
                && self.0.as_bytes()[other.0.len()] == b':')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_parent() {
        let run = ProcessId::new("wf17");
        let step = run.push("fetch").push("transform");
        assert_eq!(step.as_str(), "wf17:fetch:transform");
        assert_eq!(step.parent().unwrap().as_str(), "wf17:fetch");
        assert_eq!(run.parent(), None);
        assert_eq!(step.depth(), 3);
    }

    #[test]
    fn test_starts_with_respects_segment_boundaries() {
        let a = ProcessId::new("wf:step");
        let b = ProcessId::new("wf:step2");
        let child = a.push("inner");
        assert!(child.starts_with(&a));
        assert!(a.starts_with(&a));
        assert!(!b.starts_with(&a));
        assert!(!a.starts_with(&child));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(ProcessId::new("wf:x"), ProcessId::new("wf").push("x"));
    }
}
