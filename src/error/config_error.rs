//! Configuration-time error types.
//!
//! Everything in here is raised while a processor is being assembled or
//! validated, before any token has entered the engine. A [`ConfigError`]
//! never travels the stack as a runtime error event.

use thiserror::Error;

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Iteration depth mismatch: expected {expected}, found {found}")]
    IterationTypeMismatch { expected: usize, found: usize },
    #[error("{node} node requires at least one child")]
    EmptyProduct { node: &'static str },
    #[error("Duplicate input port in iteration strategy: {0}")]
    DuplicatePort(String),
    #[error("Invalid retry configuration: {0}")]
    InvalidRetryConfig(String),
    #[error("Invalid parallelize configuration: {0}")]
    InvalidParallelizeConfig(String),
    #[error("Dispatch stack requires at least one layer")]
    EmptyStack,
    #[error("Processor has no activities configured")]
    NoActivities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::IterationTypeMismatch {
                expected: 1,
                found: 2
            }
            .to_string(),
            "Iteration depth mismatch: expected 1, found 2"
        );
        assert_eq!(
            ConfigError::EmptyProduct { node: "cross" }.to_string(),
            "cross node requires at least one child"
        );
        assert_eq!(
            ConfigError::DuplicatePort("in".into()).to_string(),
            "Duplicate input port in iteration strategy: in"
        );
        assert_eq!(
            ConfigError::InvalidParallelizeConfig("max_jobs must be >= 1, got 0".into())
                .to_string(),
            "Invalid parallelize configuration: max_jobs must be >= 1, got 0"
        );
        assert_eq!(
            ConfigError::EmptyStack.to_string(),
            "Dispatch stack requires at least one layer"
        );
        assert_eq!(
            ConfigError::NoActivities.to_string(),
            "Processor has no activities configured"
        );
    }
}
