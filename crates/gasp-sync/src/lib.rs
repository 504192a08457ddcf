//! # GASP Sync
//!
//! Session engine for the Graph Aware Sync Protocol: reconciles the
//! unspent transaction outputs known to two peers by exchanging just
//! enough of each tip's ancestor graph for the recipient to prove anchor
//! validity.
//!
//! ## Overview
//!
//! An [`Engine`] drives a session against a [`Remote`] peer on behalf of a
//! local [`Storage`](gasp_store::Storage). Sessions are symmetric by
//! default (each side pulls the tips it lacks and pushes its own) with an
//! optional pull-only unidirectional mode.
//!
//! ## Key Properties
//!
//! - **Per-graph atomicity**: every graph a session introduces ends in
//!   exactly one of finalize or discard
//! - **Partial failure**: a failing graph is discarded and logged; the
//!   session continues with the rest
//! - **Cycle safe**: a per-root seen-set bounds recursion on cyclic or
//!   redundant peer responses
//! - **Version gated**: a protocol version mismatch fails the handshake
//!   before any storage access
//!
//! ## Message Flow
//!
//! ```text
//! Node A                              Node B
//!   |-------- InitialRequest -------->|
//!   |<------- InitialResponse --------|
//!   |-------- RequestNode ----------->|   (per tip A lacks, recursive)
//!   |<------- Node -------------------|
//!   |-------- SubmitNode ------------>|   (per tip B lacks, recursive)
//!   |<------- NodeResponse -----------|
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gasp_store::MemoryStorage;
//! use gasp_sync::{DirectRemote, Engine, EngineConfig};
//!
//! async fn example() {
//!     let storage_a = Arc::new(MemoryStorage::new());
//!     let storage_b = Arc::new(MemoryStorage::new());
//!     let a = Arc::new(Engine::new(storage_a, EngineConfig::default()));
//!     let b = Arc::new(Engine::new(storage_b, EngineConfig::default()));
//!
//!     // Symmetric wiring: each engine holds the other as its remote.
//!     a.connect(Arc::new(DirectRemote::new(b.clone()))).unwrap();
//!     b.connect(Arc::new(DirectRemote::new(a.clone()))).unwrap();
//!
//!     let report = a.sync().await.unwrap();
//!     println!("pulled {} pushed {}", report.pulled, report.pushed);
//! }
//! ```

pub mod engine;
pub mod error;
pub mod messages;
pub mod remote;

pub use engine::{Engine, EngineConfig, SyncReport};
pub use error::{Result, SyncError};
pub use messages::{InitialReply, InitialRequest, InitialResponse, PROTOCOL_VERSION};
pub use remote::{direct::DirectRemote, Remote};
