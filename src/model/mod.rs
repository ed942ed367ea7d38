//! Core value types flowing through the engine.
//!
//! - [`ProcessId`] — Hierarchical owning-process identifier (colon path).
//! - [`Index`] — Position of a value within nested iteration.
//! - [`ValueRef`] — Opaque reference to a stored value.
//! - [`Job`] / [`ResultEvent`] / [`Completion`] / [`ErrorEvent`] — The
//!   addressed events exchanged between layers.
//! - [`InvocationContext`] — Execution context threaded through jobs.

pub mod context;
pub mod event;
pub mod index;
pub mod process;
pub mod value;

pub use context::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, InvocationContext, RealIdGenerator,
    RealTimeProvider, TimeProvider,
};
pub use event::{Completion, DispatchEvent, ErrorEvent, Job, JobEvent, ResultEvent};
pub use index::Index;
pub use process::ProcessId;
pub use value::ValueRef;
