//! Compiled iteration strategy: the per-step front end.

use std::collections::HashMap;
use std::fmt;

use tracing::{trace, warn};

use crate::error::{ConfigResult, DispatchError, DispatchResult};
use crate::iteration::node::{collect_ports, compile, NodeEvent, Partial, RtNode, StrategyNode};
use crate::model::{Index, ProcessId, ValueRef};

/// What a strategy emits towards the dispatch stack.
#[derive(Debug)]
pub enum StrategyOutput {
    /// A fully-combined job (the caller attaches context and activities).
    Job {
        process: ProcessId,
        index: Index,
        inputs: HashMap<String, ValueRef>,
    },
    /// The whole stream for this owning process is complete.
    Completion { process: ProcessId },
}

/// A validated combination tree merging per-port token streams into jobs.
///
/// Construction validates the tree shape; all depth or port-name problems
/// surface as [`ConfigError`](crate::error::ConfigError)s before any token
/// flows. The runtime operations are synchronous and internally locked per
/// owning process.
pub struct IterationStrategy {
    root: RtNode,
    ports: HashMap<String, (Vec<usize>, usize)>,
}

impl fmt::Debug for IterationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ports: Vec<&str> = self.ports.keys().map(String::as_str).collect();
        ports.sort_unstable();
        f.debug_struct("IterationStrategy")
            .field("depth", &self.depth())
            .field("ports", &ports)
            .finish()
    }
}

impl IterationStrategy {
    pub fn new(root: StrategyNode) -> ConfigResult<Self> {
        let root = compile(root)?;
        let mut ports = HashMap::new();
        collect_ports(&root, &mut Vec::new(), &mut ports)?;
        Ok(Self { root, ports })
    }

    /// Combined iteration depth of emitted jobs.
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Declared depth of one input port's token stream.
    pub fn port_depth(&self, port: &str) -> Option<usize> {
        self.ports.get(port).map(|(_, d)| *d)
    }

    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    /// Feed one token arriving on `port` for `process`.
    ///
    /// Tokens for a given port must arrive in non-decreasing index order;
    /// the strategy assumes this and does not reorder.
    pub fn receive_token(
        &self,
        port: &str,
        process: &ProcessId,
        index: Index,
        value: ValueRef,
    ) -> DispatchResult<Vec<StrategyOutput>> {
        let (path, depth) = self
            .ports
            .get(port)
            .ok_or_else(|| DispatchError::UnknownPort(port.to_string()))?;
        if index.depth() != *depth {
            warn!(port, process = %process, index = %index, expected = depth,
                  "token index depth differs from declared port depth");
        }
        trace!(port, process = %process, index = %index, "token received");
        let partial = Partial {
            index,
            inputs: HashMap::from([(port.to_string(), value)]),
        };
        let emitted = self
            .root
            .deliver(process, path, NodeEvent::Partial(partial));
        Ok(self.into_outputs(process, emitted))
    }

    /// Feed a completion for `port`: no further tokens will arrive on it
    /// for `process`.
    pub fn receive_completion(
        &self,
        port: &str,
        process: &ProcessId,
    ) -> DispatchResult<Vec<StrategyOutput>> {
        let (path, _) = self
            .ports
            .get(port)
            .ok_or_else(|| DispatchError::UnknownPort(port.to_string()))?;
        trace!(port, process = %process, "port completion received");
        let emitted = self.root.deliver(process, path, NodeEvent::Completion);
        Ok(self.into_outputs(process, emitted))
    }

    /// Discard all cached per-process state.
    pub fn finished_with(&self, process: &ProcessId) {
        self.root.finished_with(process);
    }

    fn into_outputs(&self, process: &ProcessId, events: Vec<NodeEvent>) -> Vec<StrategyOutput> {
        events
            .into_iter()
            .map(|e| match e {
                NodeEvent::Partial(p) => StrategyOutput::Job {
                    process: process.clone(),
                    index: p.index,
                    inputs: p.inputs,
                },
                NodeEvent::Completion => StrategyOutput::Completion {
                    process: process.clone(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn token(
        s: &IterationStrategy,
        port: &str,
        process: &ProcessId,
        idx: Vec<u32>,
        v: &str,
    ) -> Vec<StrategyOutput> {
        s.receive_token(port, process, Index::new(idx), ValueRef::new(v))
            .unwrap()
    }

    fn jobs(outputs: &[StrategyOutput]) -> Vec<(&Index, &HashMap<String, ValueRef>)> {
        outputs
            .iter()
            .filter_map(|o| match o {
                StrategyOutput::Job { index, inputs, .. } => Some((index, inputs)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_depth_validation() {
        let err = IterationStrategy::new(StrategyNode::Dot(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 2),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IterationTypeMismatch {
                expected: 1,
                found: 2
            }
        ));

        let err = IterationStrategy::new(StrategyNode::Cross(vec![])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyProduct { node: "cross" }));

        let err = IterationStrategy::new(StrategyNode::Dot(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("a", 1),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePort(p) if p == "a"));
    }

    #[test]
    fn test_cross_depth_is_sum() {
        let s = IterationStrategy::new(StrategyNode::Cross(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 2),
        ]))
        .unwrap();
        assert_eq!(s.depth(), 3);
        assert_eq!(s.port_depth("a"), Some(1));
        assert_eq!(s.port_depth("b"), Some(2));
    }

    #[test]
    fn test_dot_emits_on_matching_index_either_order() {
        let s = IterationStrategy::new(StrategyNode::Dot(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 1),
        ]))
        .unwrap();
        let p = ProcessId::new("wf:step");

        assert!(jobs(&token(&s, "a", &p, vec![0], "a0")).is_empty());
        let out = token(&s, "b", &p, vec![0], "b0");
        let j = jobs(&out);
        assert_eq!(j.len(), 1);
        assert_eq!(j[0].0, &Index::new(vec![0]));
        assert_eq!(j[0].1["a"], ValueRef::new("a0"));
        assert_eq!(j[0].1["b"], ValueRef::new("b0"));

        // Reverse arrival order at the next index yields the same job.
        assert!(jobs(&token(&s, "b", &p, vec![1], "b1")).is_empty());
        let out = token(&s, "a", &p, vec![1], "a1");
        let j = jobs(&out);
        assert_eq!(j.len(), 1);
        assert_eq!(j[0].1["a"], ValueRef::new("a1"));
        assert_eq!(j[0].1["b"], ValueRef::new("b1"));
    }

    #[test]
    fn test_dot_pairs_out_of_order_arrivals_correctly() {
        let s = IterationStrategy::new(StrategyNode::Dot(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 1),
        ]))
        .unwrap();
        let p = ProcessId::new("wf:step");

        // One child sees 2,0,1; the other 0,1,2. Pairs must still match.
        for (idx, v) in [(2u32, "a2"), (0, "a0"), (1, "a1")] {
            token(&s, "a", &p, vec![idx], v);
        }
        let mut seen = Vec::new();
        for (idx, v) in [(0u32, "b0"), (1, "b1"), (2, "b2")] {
            for (i, inputs) in jobs(&token(&s, "b", &p, vec![idx], v)) {
                seen.push((i.clone(), inputs["a"].clone(), inputs["b"].clone()));
            }
        }
        seen.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(
            seen,
            vec![
                (Index::new(vec![0]), ValueRef::new("a0"), ValueRef::new("b0")),
                (Index::new(vec![1]), ValueRef::new("a1"), ValueRef::new("b1")),
                (Index::new(vec![2]), ValueRef::new("a2"), ValueRef::new("b2")),
            ]
        );
    }

    #[test]
    fn test_cross_completeness_m_by_n() {
        let s = IterationStrategy::new(StrategyNode::Cross(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 1),
        ]))
        .unwrap();
        let p = ProcessId::new("wf:step");

        let mut emitted = Vec::new();
        // Interleaved arrivals: a0, b0, a1, b1, a2.
        for out in [
            token(&s, "a", &p, vec![0], "a0"),
            token(&s, "b", &p, vec![0], "b0"),
            token(&s, "a", &p, vec![1], "a1"),
            token(&s, "b", &p, vec![1], "b1"),
            token(&s, "a", &p, vec![2], "a2"),
        ] {
            for (i, _) in jobs(&out) {
                emitted.push(i.clone());
            }
        }
        emitted.sort();
        let expected: Vec<Index> = vec![
            Index::new(vec![0, 0]),
            Index::new(vec![0, 1]),
            Index::new(vec![1, 0]),
            Index::new(vec![1, 1]),
            Index::new(vec![2, 0]),
            Index::new(vec![2, 1]),
        ];
        assert_eq!(emitted, expected);
    }

    #[test]
    fn test_completion_forwarded_only_when_all_children_complete() {
        let s = IterationStrategy::new(StrategyNode::Cross(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 1),
        ]))
        .unwrap();
        let p = ProcessId::new("wf:step");

        token(&s, "a", &p, vec![0], "a0");
        let out = s.receive_completion("a", &p).unwrap();
        assert!(out.is_empty());
        let out = s.receive_completion("b", &p).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], StrategyOutput::Completion { .. }));
    }

    #[test]
    fn test_unknown_port() {
        let s = IterationStrategy::new(StrategyNode::port("a", 0)).unwrap();
        let p = ProcessId::new("wf");
        assert!(matches!(
            s.receive_token("nope", &p, Index::empty(), ValueRef::new("x")),
            Err(DispatchError::UnknownPort(_))
        ));
    }

    #[test]
    fn test_single_port_passthrough() {
        let s = IterationStrategy::new(StrategyNode::port("in", 1)).unwrap();
        let p = ProcessId::new("wf:step");
        let out = token(&s, "in", &p, vec![4], "v");
        let j = jobs(&out);
        assert_eq!(j.len(), 1);
        assert_eq!(j[0].0, &Index::new(vec![4]));
    }

    #[test]
    fn test_nested_tree_dot_over_cross() {
        // dot(cross(a,b), c): cross emits depth 2, c is depth 2.
        let s = IterationStrategy::new(StrategyNode::Dot(vec![
            StrategyNode::Cross(vec![StrategyNode::port("a", 1), StrategyNode::port("b", 1)]),
            StrategyNode::port("c", 2),
        ]))
        .unwrap();
        assert_eq!(s.depth(), 2);
        let p = ProcessId::new("wf:step");

        token(&s, "a", &p, vec![0], "a0");
        token(&s, "b", &p, vec![1], "b1");
        // Cross emitted [0,1] internally; matching c token completes the dot.
        let out = token(&s, "c", &p, vec![0, 1], "c01");
        let j = jobs(&out);
        assert_eq!(j.len(), 1);
        assert_eq!(j[0].0, &Index::new(vec![0, 1]));
        assert_eq!(j[0].1.len(), 3);
    }

    #[test]
    fn test_finished_with_discards_state() {
        let s = IterationStrategy::new(StrategyNode::Dot(vec![
            StrategyNode::port("a", 1),
            StrategyNode::port("b", 1),
        ]))
        .unwrap();
        let p = ProcessId::new("wf:step");
        token(&s, "a", &p, vec![0], "a0");
        s.finished_with(&p);
        // The cached half is gone: the matching token no longer pairs.
        let out = token(&s, "b", &p, vec![0], "b0");
        assert!(jobs(&out).is_empty());
    }
}
