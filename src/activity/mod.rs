//! The invocation boundary.
//!
//! An [`Activity`] is one concrete implementation of a step — a service
//! call, a script, a sub-workflow. The engine never looks inside: it hands
//! over named input references and an execution context, and receives named
//! output references or an error. Several alternative activities can back a
//! single step; the failover layer walks the list head-first.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{InvocationContext, ValueRef};

/// Ordered candidate activity list carried by downward job events.
pub type ActivityList = Arc<[Arc<dyn Activity>]>;

/// Build an [`ActivityList`] from concrete activities.
pub fn activity_list(activities: Vec<Arc<dyn Activity>>) -> ActivityList {
    activities.into()
}

/// Failure reported by an activity invocation.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Activity failed: {0}")]
    Failed(String),
    #[error("Activity failed: {message}")]
    FailedWithCause {
        message: String,
        #[source]
        cause: anyhow::Error,
    },
}

impl ActivityError {
    pub fn message(&self) -> &str {
        match self {
            ActivityError::Failed(m) => m,
            ActivityError::FailedWithCause { message, .. } => message,
        }
    }
}

/// One concrete implementation of a step.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Short human-readable name, used in diagnostics only.
    fn name(&self) -> &str;

    /// Perform the invocation.
    ///
    /// Inputs are the job's named value references; outputs are named value
    /// references for the step's output ports. Implementations are invoked
    /// on the runtime's executor and may suspend freely.
    async fn invoke(
        &self,
        inputs: &HashMap<String, ValueRef>,
        context: &InvocationContext,
    ) -> Result<HashMap<String, ValueRef>, ActivityError>;
}
