//! Error types for evalloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in evalloop
#[derive(Debug, Error)]
pub enum EvalLoopError {
    /// An eval target failed to produce an output for a case
    #[error("Predict failed for case {index}: {message}")]
    Predict { index: usize, message: String },

    /// A scorer failed while scoring a case
    #[error("Scorer '{scorer}' failed for case {index}: {message}")]
    Scorer {
        scorer: String,
        index: usize,
        message: String,
    },

    /// A unit of work was cancelled before it could finish
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A spawned task panicked or could not be joined
    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// A stop-condition detector failed
    #[error("Detector '{name}' failed: {message}")]
    Detector { name: String, message: String },

    /// A reflector failed
    #[error("Reflector '{name}' failed: {message}")]
    Reflector { name: String, message: String },

    /// The task executor failed
    #[error("Executor error: {0}")]
    Executor(String),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for evalloop operations
pub type Result<T> = std::result::Result<T, EvalLoopError>;
