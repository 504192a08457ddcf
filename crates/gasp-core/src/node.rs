//! Node: the ancestor-or-tip record exchanged during graph sync.
//!
//! A node carries one output of one transaction, together with enough
//! context (proof, metadata, input hints) for the recipient to decide how
//! much more of the ancestor graph it needs.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{Outpoint, TxId};

/// An ancestor-or-tip record within a transaction graph.
///
/// `inputs` and the metadata fields are populated only when the request
/// that produced the node asked for metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Outpoint of the tip whose graph this node belongs to.
    pub graph_id: Outpoint,

    /// Opaque raw transaction bytes.
    pub raw_tx: Bytes,

    /// Which output of `raw_tx` this node represents.
    pub output_index: u32,

    /// Chain-inclusion proof, if the transaction is mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,

    /// Opaque per-transaction metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_metadata: Option<String>,

    /// Opaque per-output metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_metadata: Option<String>,

    /// Input outpoints of `raw_tx` with refresh hints, keyed by the
    /// canonical outpoint form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<Outpoint, InputHint>>,
}

impl Node {
    /// The identity of this node: `(txid(raw_tx), output_index)`.
    ///
    /// For a tip node this equals `graph_id`.
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(TxId::of(&self.raw_tx), self.output_index)
    }
}

/// Digest hint for one input of a node.
///
/// The sender's digest of its copy of the input transaction. The recipient
/// compares it against its own copy to decide whether it wants a fresher
/// one. An empty hash means the sender holds no copy to describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputHint {
    pub hash: String,
}

/// How a requested input should be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedInput {
    /// Whether the returned node should include metadata and input hints.
    pub metadata: bool,
}

/// The set of additional inputs a peer still needs for a graph.
///
/// An empty map means nothing further is needed; at the API boundary that
/// case is usually expressed as `Option::None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub requested_inputs: BTreeMap<Outpoint, RequestedInput>,
}

impl NodeResponse {
    /// Create an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a requested input.
    pub fn request(&mut self, outpoint: Outpoint, metadata: bool) {
        self.requested_inputs
            .insert(outpoint, RequestedInput { metadata });
    }

    /// Whether nothing further is needed.
    pub fn is_empty(&self) -> bool {
        self.requested_inputs.is_empty()
    }
}
