//! Error types for the enactment engine.
//!
//! - [`ConfigError`] — Configuration/validation failures, raised before any
//!   job flows through a processor.
//! - [`DispatchError`] — Runtime API misuse at the engine boundary.

pub mod config_error;
pub mod dispatch_error;

pub use config_error::ConfigError;
pub use dispatch_error::DispatchError;

/// Convenience alias for configuration-time results.
pub type ConfigResult<T> = Result<T, ConfigError>;
/// Convenience alias for dispatch-boundary results.
pub type DispatchResult<T> = Result<T, DispatchError>;
