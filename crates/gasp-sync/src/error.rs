//! Error types for the sync module.

use gasp_core::Outpoint;
use gasp_store::StoreError;
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Protocol version mismatch with peer. Fatal to the session.
    #[error("protocol version mismatch: current={current}, foreign={foreign}")]
    VersionMismatch { current: u32, foreign: u32 },

    /// No remote has been connected to this engine yet.
    #[error("no remote connected")]
    NotConnected,

    /// A remote is already connected to this engine.
    #[error("a remote is already connected")]
    AlreadyConnected,

    /// A peer sent something the protocol does not allow.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A failure scoped to one graph's processing.
    ///
    /// Carries the offending graph so the outer handler can discard it.
    #[error("graph {graph_id}: {source}")]
    Graph {
        graph_id: Outpoint,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Scope an error to a graph, unless it is session-fatal or already
    /// scoped.
    pub fn for_graph(graph_id: Outpoint, error: SyncError) -> Self {
        match error {
            e @ SyncError::VersionMismatch { .. } | e @ SyncError::Graph { .. } => e,
            e => SyncError::Graph {
                graph_id,
                source: Box::new(e),
            },
        }
    }

    /// Whether the error aborts the whole session rather than one graph.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::VersionMismatch { .. })
    }

    /// Stable string code for the wire error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::VersionMismatch { .. } => "version-mismatch",
            SyncError::NotConnected => "not-connected",
            SyncError::AlreadyConnected => "already-connected",
            SyncError::InvalidMessage(_) => "invalid-message",
            SyncError::Transport(_) => "transport",
            SyncError::Store(e) => e.code(),
            SyncError::Graph { source, .. } => source.code(),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gasp_core::TxId;

    fn outpoint() -> Outpoint {
        Outpoint::new(TxId::ZERO, 0)
    }

    #[test]
    fn test_for_graph_wraps_store_errors() {
        let err = SyncError::for_graph(
            outpoint(),
            SyncError::Store(StoreError::NotFound("x".into())),
        );
        assert!(matches!(err, SyncError::Graph { .. }));
        assert_eq!(err.code(), "not-found");
    }

    #[test]
    fn test_for_graph_passes_fatal_through() {
        let err = SyncError::for_graph(
            outpoint(),
            SyncError::VersionMismatch {
                current: 1,
                foreign: 2,
            },
        );
        assert!(err.is_fatal());
        assert_eq!(err.code(), "version-mismatch");
    }

    #[test]
    fn test_for_graph_does_not_nest() {
        let inner = SyncError::for_graph(outpoint(), SyncError::Transport("boom".into()));
        let outer = SyncError::for_graph(outpoint(), inner);
        match outer {
            SyncError::Graph { source, .. } => {
                assert!(matches!(*source, SyncError::Transport(_)))
            }
            other => panic!("expected Graph, got {other:?}"),
        }
    }
}
