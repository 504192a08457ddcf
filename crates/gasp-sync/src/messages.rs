//! Handshake message types.
//!
//! These messages open a sync session; node traffic afterwards uses the
//! [`Node`](gasp_core::Node) and [`NodeResponse`](gasp_core::NodeResponse)
//! records from `gasp-core`.

use serde::{Deserialize, Serialize};

use gasp_core::Outpoint;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Kicks off a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialRequest {
    /// Protocol version for compatibility checking.
    pub version: u32,
    /// Only list UTXOs the requester has not seen as of this watermark.
    pub since: u64,
}

/// The responder's tips, filtered by the requester's watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialResponse {
    /// Tips the responder knows.
    pub utxo_list: Vec<Outpoint>,
    /// The responder's own watermark, stored by the requester for the
    /// next session. Opaque to the protocol.
    pub since: u64,
}

/// Tips the initiator has that the responder did not list.
///
/// Absent in unidirectional mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialReply {
    pub utxo_list: Vec<Outpoint>,
}
