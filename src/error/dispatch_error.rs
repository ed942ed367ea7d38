//! Runtime dispatch-boundary errors.

use thiserror::Error;

/// Errors raised at the engine boundary while tokens are flowing.
///
/// These cover misuse of the public API (unknown port names, tokens for a
/// process that already finished). Step-level failures travel the stack as
/// [`ErrorEvent`](crate::model::ErrorEvent)s instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown input port: {0}")]
    UnknownPort(String),
    #[error("Token received for completed input port: {port} ({process})")]
    PortAlreadyCompleted { port: String, process: String },
    #[error("Event received after cleanup for process: {0}")]
    ProcessFinished(String),
    #[error("Output channel closed")]
    OutputChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display() {
        assert_eq!(
            DispatchError::UnknownPort("left".into()).to_string(),
            "Unknown input port: left"
        );
        assert_eq!(
            DispatchError::ProcessFinished("wf1:step".into()).to_string(),
            "Event received after cleanup for process: wf1:step"
        );
        assert_eq!(
            DispatchError::OutputChannelClosed.to_string(),
            "Output channel closed"
        );
    }
}
