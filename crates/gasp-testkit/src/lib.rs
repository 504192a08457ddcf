//! # GASP Testkit
//!
//! Testing utilities for the Graph Aware Sync Protocol.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Deterministic transactions**: [`TestTx`] derives stable raw bytes
//!   (and therefore stable txids) from a name, with builder methods for
//!   inputs, proofs, and metadata
//! - **Storage seeding**: [`seed_tx`] / [`seed_utxo`] helpers
//! - **Peer wiring**: [`wired_pair`] builds two engines that hold each
//!   other as remote, the standard setup for protocol tests
//!
//! ## Usage
//!
//! ```rust
//! use gasp_sync::EngineConfig;
//! use gasp_testkit::{seed_utxo, wired_pair, TestTx};
//!
//! let pair = wired_pair(EngineConfig::default(), EngineConfig::default());
//! let tip = TestTx::new("tip").proven();
//! seed_utxo(&pair.storage_a, &tip, 0, Some(111));
//! ```

pub mod fixtures;

pub use fixtures::{seed_tx, seed_utxo, wired_pair, wired_pair_with, PeerPair, TestTx};
