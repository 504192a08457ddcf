//! # GASP Core
//!
//! Pure data model for the Graph Aware Sync Protocol: transaction
//! identifiers, outpoints, and the node records exchanged while two peers
//! reconcile their UTXO graphs.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over protocol data structures.
//!
//! ## Key Types
//!
//! - [`TxId`] - Content-addressed transaction identifier (double SHA-256)
//! - [`Outpoint`] - `(txid, output_index)` pair with the canonical wire form
//! - [`Node`] - An ancestor-or-tip record within a sync graph
//! - [`NodeResponse`] - The additional inputs a peer still needs
//!
//! ## Canonical outpoint form
//!
//! Wire maps are keyed by the outpoint "36-byte form",
//! `"<64-hex-txid>.<decimal-index>"`. See [`Outpoint::encode36`].

pub mod error;
pub mod node;
pub mod types;

pub use error::CoreError;
pub use node::{InputHint, Node, NodeResponse, RequestedInput};
pub use types::{Outpoint, TxId};
