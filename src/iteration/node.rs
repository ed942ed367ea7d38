//! Strategy node tree: declarative shape and compiled runtime form.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};
use crate::iteration::cross::CrossState;
use crate::iteration::dot::DotState;
use crate::model::{Index, ProcessId, ValueRef};

/// Declarative iteration-strategy tree.
///
/// Leaves name the input ports of the step together with the iteration
/// depth of the token stream arriving on that port.
#[derive(Debug, Clone)]
pub enum StrategyNode {
    Cross(Vec<StrategyNode>),
    Dot(Vec<StrategyNode>),
    Port { name: String, depth: usize },
}

impl StrategyNode {
    /// Leaf shorthand.
    pub fn port(name: impl Into<String>, depth: usize) -> Self {
        StrategyNode::Port {
            name: name.into(),
            depth,
        }
    }
}

/// Partially-combined job travelling up the node tree.
#[derive(Debug, Clone)]
pub(crate) struct Partial {
    pub index: Index,
    pub inputs: HashMap<String, ValueRef>,
}

impl Partial {
    /// Union of input maps across parts. Port names are unique tree-wide,
    /// so no entry is ever overwritten.
    pub(crate) fn merge<'a>(index: Index, parts: impl Iterator<Item = &'a Partial>) -> Partial {
        let mut inputs = HashMap::new();
        for p in parts {
            inputs.extend(p.inputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Partial { index, inputs }
    }
}

/// Event moving between nodes of the compiled tree.
#[derive(Debug)]
pub(crate) enum NodeEvent {
    Partial(Partial),
    Completion,
}

/// Compiled runtime node.
pub(crate) enum RtNode {
    Port {
        name: String,
        depth: usize,
    },
    Dot {
        children: Vec<RtNode>,
        depth: usize,
        state: DotState,
    },
    Cross {
        children: Vec<RtNode>,
        depth: usize,
        state: CrossState,
    },
}

impl RtNode {
    pub(crate) fn depth(&self) -> usize {
        match self {
            RtNode::Port { depth, .. } => *depth,
            RtNode::Dot { depth, .. } => *depth,
            RtNode::Cross { depth, .. } => *depth,
        }
    }

    /// Route an event down `path` to its leaf, then combine results on the
    /// way back up. Returns the events this subtree emits to its parent.
    pub(crate) fn deliver(
        &self,
        process: &ProcessId,
        path: &[usize],
        event: NodeEvent,
    ) -> Vec<NodeEvent> {
        match self {
            RtNode::Port { .. } => vec![event],
            RtNode::Dot {
                children, state, ..
            } => {
                let slot = path[0];
                children[slot]
                    .deliver(process, &path[1..], event)
                    .into_iter()
                    .flat_map(|e| state.receive(process, slot, children.len(), e))
                    .collect()
            }
            RtNode::Cross {
                children, state, ..
            } => {
                let slot = path[0];
                children[slot]
                    .deliver(process, &path[1..], event)
                    .into_iter()
                    .flat_map(|e| state.receive(process, slot, children.len(), e))
                    .collect()
            }
        }
    }

    /// Discard all cached state for `process`, recursively.
    pub(crate) fn finished_with(&self, process: &ProcessId) {
        match self {
            RtNode::Port { .. } => {}
            RtNode::Dot {
                children, state, ..
            } => {
                state.clear(process);
                for c in children {
                    c.finished_with(process);
                }
            }
            RtNode::Cross {
                children, state, ..
            } => {
                state.clear(process);
                for c in children {
                    c.finished_with(process);
                }
            }
        }
    }
}

/// Compile the declarative tree, validating depths.
pub(crate) fn compile(node: StrategyNode) -> ConfigResult<RtNode> {
    match node {
        StrategyNode::Port { name, depth } => Ok(RtNode::Port { name, depth }),
        StrategyNode::Dot(children) => {
            if children.is_empty() {
                return Err(ConfigError::EmptyProduct { node: "dot" });
            }
            let children = children
                .into_iter()
                .map(compile)
                .collect::<ConfigResult<Vec<_>>>()?;
            let depth = children[0].depth();
            for c in &children[1..] {
                if c.depth() != depth {
                    return Err(ConfigError::IterationTypeMismatch {
                        expected: depth,
                        found: c.depth(),
                    });
                }
            }
            Ok(RtNode::Dot {
                children,
                depth,
                state: DotState::default(),
            })
        }
        StrategyNode::Cross(children) => {
            if children.is_empty() {
                return Err(ConfigError::EmptyProduct { node: "cross" });
            }
            let children = children
                .into_iter()
                .map(compile)
                .collect::<ConfigResult<Vec<_>>>()?;
            let depth = children.iter().map(RtNode::depth).sum();
            Ok(RtNode::Cross {
                children,
                depth,
                state: CrossState::default(),
            })
        }
    }
}

/// Collect leaf port names and their root-to-leaf child paths.
pub(crate) fn collect_ports(
    node: &RtNode,
    path: &mut Vec<usize>,
    out: &mut HashMap<String, (Vec<usize>, usize)>,
) -> ConfigResult<()> {
    match node {
        RtNode::Port { name, depth } => {
            if out.insert(name.clone(), (path.clone(), *depth)).is_some() {
                return Err(ConfigError::DuplicatePort(name.clone()));
            }
            Ok(())
        }
        RtNode::Dot { children, .. } | RtNode::Cross { children, .. } => {
            for (i, c) in children.iter().enumerate() {
                path.push(i);
                collect_ports(c, path, out)?;
                path.pop();
            }
            Ok(())
        }
    }
}
