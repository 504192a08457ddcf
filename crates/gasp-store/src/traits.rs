//! Storage trait: the abstract interface to the host's UTXO knowledge.
//!
//! This trait allows the sync engine to be storage-agnostic. The host owns
//! the authoritative known-UTXO set plus transient per-graph scratch space,
//! and decides which ancestors it wants and whether a graph's anchor is
//! acceptable.

use async_trait::async_trait;
use gasp_core::{Node, NodeResponse, Outpoint, TxId};

use crate::error::Result;

/// The Storage trait: async interface for the engine's local collaborator.
///
/// # Design Notes
///
/// - **Two-phase graphs**: nodes accumulate in a temporary graph keyed by
///   `graph_id`; the graph leaves that state through exactly one of
///   [`finalize_graph`](Storage::finalize_graph) (all nodes kept, tip
///   becomes known) or [`discard_graph`](Storage::discard_graph) (all nodes
///   dropped).
/// - **Idempotent appends**: re-appending a node already present in the
///   graph extends it in place and is not an error.
/// - **Host policy**: [`find_needed_inputs`](Storage::find_needed_inputs)
///   is where the host decides which ancestors it wants; the engine only
///   relays those decisions.
/// - **Internal atomicity**: implementations provide their own atomicity
///   for append/finalize/discard on a given `graph_id`; the engine takes
///   no locks around storage calls.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List known UTXOs.
    ///
    /// Returns every UTXO with `time > since`, plus every UTXO with no
    /// timestamp (unconfirmed outputs are always included).
    async fn find_known_utxos(&self, since: u64) -> Result<Vec<Outpoint>>;

    /// Build a [`Node`] for a known transaction output, in the context of
    /// the given graph.
    ///
    /// With `metadata = true` the node carries transaction and output
    /// metadata plus input hints. Fails with
    /// [`NotFound`](crate::StoreError::NotFound) if the transaction is not
    /// known.
    async fn hydrate_node(
        &self,
        graph_id: &Outpoint,
        txid: &TxId,
        output_index: u32,
        metadata: bool,
    ) -> Result<Node>;

    /// Decide which of a node's inputs are still needed.
    ///
    /// `None` (or an empty response) means the node needs nothing further:
    /// it is either chain-proven or all of its relevant ancestors are
    /// already held. The host may also request a metadata refresh for an
    /// ancestor it holds a stale copy of.
    async fn find_needed_inputs(&self, node: &Node) -> Result<Option<NodeResponse>>;

    /// Append a node to the temporary graph identified by its `graph_id`.
    ///
    /// `spent_by` names the already-appended node that consumes this one;
    /// it is `None` only for the graph's root (the tip). May fail with
    /// [`Unwanted`](crate::StoreError::Unwanted) if the graph is not
    /// desired or [`TooLarge`](crate::StoreError::TooLarge) if the
    /// host-configured bound is exceeded.
    async fn append_to_graph(&self, node: &Node, spent_by: Option<&Outpoint>) -> Result<()>;

    /// Check that every frontier leaf of the temporary graph is either
    /// chain-proven or already trusted.
    async fn validate_graph_anchor(&self, graph_id: &Outpoint) -> Result<()>;

    /// Drop the temporary graph. Best-effort: succeeds even if the graph
    /// does not exist.
    async fn discard_graph(&self, graph_id: &Outpoint) -> Result<()>;

    /// Atomically promote the temporary graph: all nodes become known and
    /// the tip joins the known-UTXO set.
    async fn finalize_graph(&self, graph_id: &Outpoint) -> Result<()>;
}
