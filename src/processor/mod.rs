//! Processor front end: one step's iteration strategy wired to its
//! dispatch stack.
//!
//! A [`Processor`] accepts per-port token streams, lets the iteration
//! strategy combine them into jobs, wraps each job with the step's
//! candidate activities and pushes it into the dispatch stack. Results,
//! completions and unhandled errors surface on the stack's output channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::activity::{Activity, ActivityList};
use crate::dispatch::{
    AlwaysSatisfied, DispatchConditions, DispatchLayer, DispatchStack, ErrorShapeConfig,
    ErrorShapeLayer, FailoverLayer, InvokeLayer, LoopConfig, LoopLayer, ParallelizeConfig,
    ParallelizeLayer, RetryConfig, RetryLayer, StackOutput,
};
use crate::error::{ConfigError, ConfigResult, DispatchResult};
use crate::iteration::{IterationStrategy, StrategyNode, StrategyOutput};
use crate::model::{
    Completion, DispatchEvent, Index, InvocationContext, Job, JobEvent, ProcessId, ValueRef,
};
use crate::monitor::ProcessMonitor;

/// One enactable step: iteration strategy + dispatch stack + activities.
pub struct Processor {
    strategy: Arc<IterationStrategy>,
    stack: DispatchStack,
    activities: ActivityList,
    context: InvocationContext,
}

impl Processor {
    /// Start building a processor named `name` over the given combination
    /// tree.
    pub fn builder(name: impl Into<String>, strategy: StrategyNode) -> ProcessorBuilder {
        ProcessorBuilder {
            name: name.into(),
            strategy,
            activities: Vec::new(),
            layers: None,
            parallelize: ParallelizeConfig::default(),
            retry: RetryConfig::default(),
            error_ports: None,
            loop_config: None,
            conditions: Arc::new(AlwaysSatisfied),
            monitor: None,
            context: InvocationContext::default(),
        }
    }

    /// Feed one token arriving on `port`.
    pub async fn input_token(
        &self,
        port: &str,
        process: &ProcessId,
        index: Index,
        value: ValueRef,
    ) -> DispatchResult<()> {
        let outputs = self.strategy.receive_token(port, process, index, value)?;
        self.push_outputs(outputs).await;
        Ok(())
    }

    /// Signal that no further tokens will arrive on `port` for `process`.
    pub async fn input_completion(&self, port: &str, process: &ProcessId) -> DispatchResult<()> {
        let outputs = self.strategy.receive_completion(port, process)?;
        self.push_outputs(outputs).await;
        Ok(())
    }

    /// Notify the stack that a previously-unsatisfied precondition for
    /// `enclosing` now holds.
    pub async fn satisfy_conditions(&self, enclosing: &ProcessId) {
        self.stack.satisfy_conditions(enclosing).await;
    }

    pub fn stack(&self) -> &DispatchStack {
        &self.stack
    }

    pub fn strategy(&self) -> &IterationStrategy {
        &self.strategy
    }

    async fn push_outputs(&self, outputs: Vec<StrategyOutput>) {
        for output in outputs {
            match output {
                StrategyOutput::Job {
                    process,
                    index,
                    inputs,
                } => {
                    let job = Job::new(process, index, inputs, self.context.clone());
                    self.stack
                        .receive_event(DispatchEvent::Job(JobEvent::new(
                            job,
                            self.activities.clone(),
                        )))
                        .await;
                }
                StrategyOutput::Completion { process } => {
                    self.stack
                        .receive_event(DispatchEvent::Completion(Completion::final_for(process)))
                        .await;
                }
            }
        }
    }
}

/// Builder for [`Processor`].
///
/// By default the stack is Parallelize → Failover → Retry → Invoke, with an
/// error-shape layer spliced in under Parallelize when `error_ports` is
/// configured and a loop layer above Invoke when `loop_config` is.
pub struct ProcessorBuilder {
    name: String,
    strategy: StrategyNode,
    activities: Vec<Arc<dyn Activity>>,
    layers: Option<Vec<Arc<dyn DispatchLayer>>>,
    parallelize: ParallelizeConfig,
    retry: RetryConfig,
    error_ports: Option<Vec<String>>,
    loop_config: Option<LoopConfig>,
    conditions: Arc<dyn DispatchConditions>,
    monitor: Option<Arc<ProcessMonitor>>,
    context: InvocationContext,
}

impl ProcessorBuilder {
    /// Append one candidate activity (failover order).
    pub fn activity(mut self, activity: Arc<dyn Activity>) -> Self {
        self.activities.push(activity);
        self
    }

    /// Replace the default layer stack entirely (top first).
    pub fn layers(mut self, layers: Vec<Arc<dyn DispatchLayer>>) -> Self {
        self.layers = Some(layers);
        self
    }

    pub fn max_jobs(mut self, max_jobs: usize) -> Self {
        self.parallelize.max_jobs = max_jobs;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Surface unrecoverable errors as error-value results on these ports.
    pub fn error_ports(mut self, ports: Vec<String>) -> Self {
        self.error_ports = Some(ports);
        self
    }

    pub fn loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_config = Some(config);
        self
    }

    pub fn conditions(mut self, conditions: Arc<dyn DispatchConditions>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn monitor(mut self, monitor: Arc<ProcessMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn context(mut self, context: InvocationContext) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> ConfigResult<(Processor, mpsc::UnboundedReceiver<StackOutput>)> {
        if self.activities.is_empty() {
            return Err(ConfigError::NoActivities);
        }
        let strategy = Arc::new(IterationStrategy::new(self.strategy)?);

        let layers = match self.layers {
            Some(layers) => layers,
            None => {
                let mut layers: Vec<Arc<dyn DispatchLayer>> =
                    vec![Arc::new(ParallelizeLayer::new(self.parallelize)?)];
                if let Some(ports) = self.error_ports {
                    layers.push(Arc::new(ErrorShapeLayer::new(ErrorShapeConfig {
                        output_ports: ports,
                    })));
                }
                layers.push(Arc::new(FailoverLayer::new()));
                layers.push(Arc::new(RetryLayer::new(self.retry)?));
                if let Some(loop_config) = self.loop_config {
                    layers.push(Arc::new(LoopLayer::new(loop_config)));
                }
                layers.push(Arc::new(InvokeLayer::new()));
                layers
            }
        };

        let mut context = self.context;
        if let Some(monitor) = &self.monitor {
            context = context.with_monitor(Arc::clone(monitor));
        }

        let (stack, outputs) =
            DispatchStack::new(self.name, layers, self.conditions, self.monitor)?;

        // Step state dies with the owning process: terminal cleanup also
        // clears the strategy's caches.
        let hook_strategy = Arc::clone(&strategy);
        stack.set_cleanup_hook(move |process| hook_strategy.finished_with(process));

        Ok((
            Processor {
                strategy,
                stack,
                activities: self.activities.into(),
                context,
            },
            outputs,
        ))
    }
}
