//! # Tokenflow — a workflow-enactment dispatch engine
//!
//! `tokenflow` drives step invocation in a declarative workflow graph by
//! streaming value-tokens through it:
//!
//! - **Iteration strategies**: a tree of dot-product and cross-product
//!   nodes merges per-input-port token streams into complete invocation
//!   jobs with combined indices.
//! - **Dispatch stack**: each job travels down an ordered, reconfigurable
//!   stack of policy layers — parallelism limiting, error shaping,
//!   failover, retry with backoff, conditional looping — to an invocation
//!   layer, and its results, errors and completions travel back up.
//! - **Owning processes**: every stream is addressed by a hierarchical
//!   colon-joined process path; per-process queues are precondition-gated
//!   and purged exactly once on terminal completion.
//! - **Monitoring**: a shared process tree tracks live invocation nodes
//!   with delayed removal, so observers can read terminal state.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokenflow::{
//!     Index, Processor, ProcessId, RetryConfig, StrategyNode, ValueRef,
//! };
//!
//! # fn make_activity() -> Arc<dyn tokenflow::Activity> { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let strategy = StrategyNode::Cross(vec![
//!         StrategyNode::port("left", 1),
//!         StrategyNode::port("right", 1),
//!     ]);
//!     let (processor, mut outputs) = Processor::builder("merge", strategy)
//!         .activity(make_activity())
//!         .retry(RetryConfig { max_retries: 2, ..Default::default() })
//!         .max_jobs(4)
//!         .build()
//!         .unwrap();
//!
//!     let process = ProcessId::new("run-1").push("merge");
//!     processor
//!         .input_token("left", &process, Index::new(vec![0]), ValueRef::new("ref-a"))
//!         .await
//!         .unwrap();
//!     processor
//!         .input_token("right", &process, Index::new(vec![0]), ValueRef::new("ref-b"))
//!         .await
//!         .unwrap();
//!     processor.input_completion("left", &process).await.unwrap();
//!     processor.input_completion("right", &process).await.unwrap();
//!
//!     while let Some(output) = outputs.recv().await {
//!         println!("{output:?}");
//!     }
//! }
//! ```

pub mod activity;
pub mod dispatch;
pub mod error;
pub mod iteration;
pub mod model;
pub mod monitor;
pub mod processor;

pub use crate::activity::{activity_list, Activity, ActivityError, ActivityList};
pub use crate::dispatch::{
    AlwaysSatisfied, DispatchConditions, DispatchLayer, DispatchStack, ErrorShapeConfig,
    ErrorShapeLayer, FailoverLayer, InvokeLayer, JobQueue, JobQueueEvent, LayerContext,
    LoopConfig, LoopLayer, ParallelizeConfig, ParallelizeLayer, RetryConfig, RetryLayer,
    StackOutput,
};
pub use crate::error::{ConfigError, ConfigResult, DispatchError, DispatchResult};
pub use crate::iteration::{IterationStrategy, StrategyNode, StrategyOutput};
pub use crate::model::{
    Completion, DispatchEvent, ErrorEvent, FakeIdGenerator, FakeTimeProvider, IdGenerator, Index,
    InvocationContext, Job, JobEvent, ProcessId, RealIdGenerator, RealTimeProvider, ResultEvent,
    TimeProvider, ValueRef,
};
pub use crate::monitor::{MonitorMessage, MonitorNodeSnapshot, ProcessMonitor};
pub use crate::processor::{Processor, ProcessorBuilder};
