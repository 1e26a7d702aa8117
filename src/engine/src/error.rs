//! Error types for the policy engine

use thiserror::Error;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A node key could not be parsed into the requested kind
    #[error("Invalid node key: {0}")]
    InvalidNodeKey(String),

    /// A context key or value was empty
    #[error("Invalid context entry: {0}")]
    InvalidContext(String),

    /// A background recomputation failed
    #[error("Recompute failed: {0}")]
    Recompute(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for policy engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
