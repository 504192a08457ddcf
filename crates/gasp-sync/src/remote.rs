//! Remote peer abstraction for the sync protocol.
//!
//! A [`Remote`] is the symmetric counterpart of the engine's exposed
//! operations. Implementations may sit on a network transport or, as in
//! tests, delegate to another engine in the same process.

use async_trait::async_trait;

use gasp_core::{Node, NodeResponse, Outpoint, TxId};

use crate::error::Result;
use crate::messages::{InitialReply, InitialRequest, InitialResponse};

/// The four protocol operations a peer exposes.
///
/// Implementations must be thread-safe (Send + Sync). Transport failures
/// surface as [`SyncError::Transport`](crate::SyncError::Transport).
#[async_trait]
pub trait Remote: Send + Sync {
    /// Open a session: ask the peer for its tips.
    async fn get_initial_response(&self, request: InitialRequest) -> Result<InitialResponse>;

    /// Ask the peer which of the listed tips it did not already know.
    async fn get_initial_reply(&self, response: InitialResponse) -> Result<InitialReply>;

    /// Fetch one node of a graph from the peer.
    async fn request_node(
        &self,
        graph_id: &Outpoint,
        txid: &TxId,
        output_index: u32,
        metadata: bool,
    ) -> Result<Node>;

    /// Push one node of a graph to the peer. `None` means the peer needs
    /// nothing further for this branch.
    async fn submit_node(&self, node: Node) -> Result<Option<NodeResponse>>;
}

/// An in-process remote for tests: delegates straight to another engine.
///
/// Two symmetric engines are wired by constructing both, then connecting
/// each to a `DirectRemote` wrapping the other.
pub mod direct {
    use std::sync::Arc;

    use super::*;
    use crate::engine::Engine;
    use gasp_store::Storage;

    /// A [`Remote`] backed by another [`Engine`] in the same process.
    pub struct DirectRemote<S: Storage> {
        engine: Arc<Engine<S>>,
    }

    impl<S: Storage> DirectRemote<S> {
        /// Wrap an engine as a peer endpoint.
        pub fn new(engine: Arc<Engine<S>>) -> Self {
            Self { engine }
        }
    }

    #[async_trait]
    impl<S: Storage + 'static> Remote for DirectRemote<S> {
        async fn get_initial_response(
            &self,
            request: InitialRequest,
        ) -> Result<InitialResponse> {
            self.engine.get_initial_response(request).await
        }

        async fn get_initial_reply(&self, response: InitialResponse) -> Result<InitialReply> {
            self.engine.get_initial_reply(response).await
        }

        async fn request_node(
            &self,
            graph_id: &Outpoint,
            txid: &TxId,
            output_index: u32,
            metadata: bool,
        ) -> Result<Node> {
            self.engine
                .request_node(graph_id, txid, output_index, metadata)
                .await
        }

        async fn submit_node(&self, node: Node) -> Result<Option<NodeResponse>> {
            self.engine.submit_node(node).await
        }
    }
}
