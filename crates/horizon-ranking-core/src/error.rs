//! Error types for Horizon Ranking core primitives.

use std::fmt;

/// The main error type for core operations.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// Async runtime error.
    AsyncRuntime(AsyncRuntimeError),
    /// A spawned task ended without delivering its result.
    TaskAborted {
        /// The runtime-assigned task id.
        task_id: u64,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncRuntime(err) => write!(f, "Async runtime error: {err}"),
            Self::TaskAborted { task_id } => {
                write!(f, "Task {task_id} ended without a result")
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AsyncRuntime(err) => Some(err),
            Self::TaskAborted { .. } => None,
        }
    }
}

impl From<AsyncRuntimeError> for CoreError {
    fn from(err: AsyncRuntimeError) -> Self {
        Self::AsyncRuntime(err)
    }
}

/// Errors that can occur with the async runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncRuntimeError {
    /// No Tokio runtime is running on the current thread.
    NoCurrentRuntime,
    /// Failed to create the runtime.
    CreationFailed(String),
}

impl fmt::Display for AsyncRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCurrentRuntime => write!(f, "No async runtime is running on this thread"),
            Self::CreationFailed(msg) => write!(f, "Failed to create async runtime: {msg}"),
        }
    }
}

impl std::error::Error for AsyncRuntimeError {}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
