//! Iteration strategies.
//!
//! A strategy is a tree of combination nodes merging per-input-port token
//! streams into complete invocation jobs:
//!
//! - **Dot product** — children are matched by identical index; a combined
//!   job is emitted the moment every child has produced one at that index.
//! - **Cross product** — all-against-all join; combined indices are the
//!   concatenation of child indices in child order.
//!
//! Trees are declared with [`StrategyNode`] and compiled into an
//! [`IterationStrategy`], which validates depths up front: mismatched dot
//! depths or childless products are configuration errors, never runtime
//! events.

mod cross;
mod dot;
mod node;
mod strategy;

pub use node::StrategyNode;
pub use strategy::{IterationStrategy, StrategyOutput};
