// crates/permalign-core/src/error.rs

use thiserror::Error;

/// Workspace-wide error type for permutation weight matching.
#[derive(Debug, Error)]
pub enum PermAlignError {
    /// Invalid configuration (unknown initialization method, zero trials).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid numeric input (negative entries, non-finite scores).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tensor or matrix shapes do not agree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Inconsistent permutation topology.
    #[error("Topology error: {0}")]
    Topology(String),

    /// Parameter or permutation variable not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A numerical collaborator (assignment, line search) failed.
    #[error("Solver error: {0}")]
    Solver(String),

    /// Invalid trial state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PermAlignError {
    fn from(e: serde_json::Error) -> Self {
        PermAlignError::Serialization(e.to_string())
    }
}
