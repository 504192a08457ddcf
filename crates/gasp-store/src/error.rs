//! Error types for the store module.

use gasp_core::Outpoint;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested node is not known.
    #[error("node not found: {0}")]
    NotFound(String),

    /// The storage does not want the graph a node was appended to.
    #[error("graph {graph_id} is not wanted")]
    Unwanted { graph_id: Outpoint },

    /// Appending would exceed the host-configured graph bound.
    #[error("graph {graph_id} exceeds the {limit}-node bound")]
    TooLarge { graph_id: Outpoint, limit: usize },

    /// A frontier leaf of the graph is neither chain-proven nor trusted.
    #[error("anchor validation failed for graph {graph_id}: {reason}")]
    AnchorInvalid { graph_id: Outpoint, reason: String },

    /// Backend failure (I/O, corruption, missing temporary state).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Stable string code for the wire error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not-found",
            StoreError::Unwanted { .. } => "unwanted",
            StoreError::TooLarge { .. } => "too-large",
            StoreError::AnchorInvalid { .. } => "anchor-invalid",
            StoreError::Backend(_) => "backend",
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
