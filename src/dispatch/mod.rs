//! The dispatch stack: ordered policy layers between iteration and
//! invocation.
//!
//! Jobs enter at the top and travel down through policy layers to the
//! invoke layer at the bottom; results, errors and completions travel back
//! up the same stack. Layers resolve their neighbors dynamically through
//! the owning stack, so the layer list can be reconfigured between runs.
//!
//! - [`DispatchLayer`] — the uniform bidirectional layer interface.
//! - [`DispatchStack`] — the ordered container: queueing, precondition
//!   gating, terminal routing, exactly-once cleanup.
//! - [`ParallelizeLayer`] — queue consumer with a concurrency cap.
//! - [`ErrorShapeLayer`] — converts unrecoverable errors into error-value
//!   results.
//! - [`FailoverLayer`] — walks alternative activities on failure.
//! - [`RetryLayer`] — delayed re-submission with exponential backoff.
//! - [`LoopLayer`] — condition-driven repetition.
//! - [`InvokeLayer`] — hands jobs to the [`Activity`](crate::activity::Activity)
//!   boundary.

pub mod error_shape;
pub mod failover;
pub mod invoke;
pub mod layer;
pub mod loop_layer;
pub mod parallelize;
pub mod retry;
pub mod stack;
pub(crate) mod state;

pub use error_shape::{ErrorShapeConfig, ErrorShapeLayer};
pub use failover::FailoverLayer;
pub use invoke::InvokeLayer;
pub use layer::{DispatchLayer, JobQueueEvent, LayerContext};
pub use loop_layer::{LoopConfig, LoopLayer};
pub use parallelize::{ParallelizeConfig, ParallelizeLayer};
pub use retry::{RetryConfig, RetryLayer};
pub use stack::{AlwaysSatisfied, DispatchConditions, DispatchStack, JobQueue, StackOutput};
