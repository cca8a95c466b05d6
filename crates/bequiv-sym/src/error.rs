//! Error types for the symbolic memory strategies.

use thiserror::Error;

/// Failures raised while recording accesses or generating aliasing
/// constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("cell assignment search exceeded {limit} explored states")]
    SearchBound { limit: usize },

    #[error("basic strategy exceeded {limit} recorded accesses")]
    AccessBound { limit: usize },

    #[error("memory instances use different alias strategies")]
    StrategyMismatch,

    #[error("memory instance was not finalized before constraint generation")]
    NotFinalized,
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
