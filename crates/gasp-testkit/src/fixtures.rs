//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: deterministic transactions
//! (named raw bytes give stable txids) and pre-wired peer pairs.

use std::sync::Arc;

use bytes::Bytes;

use gasp_core::{Outpoint, TxId};
use gasp_store::{MemoryStorage, TxRecord};
use gasp_sync::{DirectRemote, Engine, EngineConfig};

/// A deterministic test transaction.
///
/// The raw bytes are derived from the name, so the same name always
/// yields the same txid.
#[derive(Debug, Clone)]
pub struct TestTx {
    name: String,
    inputs: Vec<Outpoint>,
    proof: Option<String>,
    tx_metadata: Option<String>,
    output_metadata: Option<String>,
}

impl TestTx {
    /// Create an unproven transaction with no inputs.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: Vec::new(),
            proof: None,
            tx_metadata: None,
            output_metadata: None,
        }
    }

    /// Attach a chain-inclusion proof.
    pub fn proven(mut self) -> Self {
        self.proof = Some(format!("proof:{}", self.name));
        self
    }

    /// Declare an input outpoint.
    pub fn input(mut self, outpoint: Outpoint) -> Self {
        self.inputs.push(outpoint);
        self
    }

    /// Attach transaction metadata.
    pub fn tx_metadata(mut self, metadata: &str) -> Self {
        self.tx_metadata = Some(metadata.to_string());
        self
    }

    /// Attach output metadata.
    pub fn output_metadata(mut self, metadata: &str) -> Self {
        self.output_metadata = Some(metadata.to_string());
        self
    }

    /// The raw transaction bytes.
    pub fn raw_tx(&self) -> Bytes {
        Bytes::from(format!("rawtx:{}", self.name))
    }

    /// The transaction id.
    pub fn txid(&self) -> TxId {
        TxId::of(&self.raw_tx())
    }

    /// An outpoint of this transaction.
    pub fn outpoint(&self, output_index: u32) -> Outpoint {
        Outpoint::new(self.txid(), output_index)
    }

    /// The storage record for this transaction.
    pub fn record(&self) -> TxRecord {
        TxRecord {
            raw_tx: self.raw_tx(),
            inputs: self.inputs.clone(),
            proof: self.proof.clone(),
            tx_metadata: self.tx_metadata.clone(),
            output_metadata: self.output_metadata.clone(),
        }
    }
}

/// Insert a transaction into a store without marking any output as a UTXO
/// (an ancestor the store merely trusts).
pub fn seed_tx(storage: &MemoryStorage, tx: &TestTx) {
    storage.insert_tx(tx.record());
}

/// Insert a transaction and mark one of its outputs as a known UTXO.
pub fn seed_utxo(
    storage: &MemoryStorage,
    tx: &TestTx,
    output_index: u32,
    time: Option<u64>,
) -> Outpoint {
    storage.insert_tx(tx.record());
    let outpoint = tx.outpoint(output_index);
    storage.insert_utxo(outpoint.clone(), time);
    outpoint
}

/// Two engines wired to each other in-process.
pub struct PeerPair {
    pub a: Arc<Engine<MemoryStorage>>,
    pub b: Arc<Engine<MemoryStorage>>,
    pub storage_a: Arc<MemoryStorage>,
    pub storage_b: Arc<MemoryStorage>,
}

/// Construct two engines holding each other as remote.
pub fn wired_pair(config_a: EngineConfig, config_b: EngineConfig) -> PeerPair {
    wired_pair_with(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
        config_a,
        config_b,
    )
}

/// Construct a wired pair over pre-seeded storages.
pub fn wired_pair_with(
    storage_a: Arc<MemoryStorage>,
    storage_b: Arc<MemoryStorage>,
    config_a: EngineConfig,
    config_b: EngineConfig,
) -> PeerPair {
    let a = Arc::new(Engine::new(storage_a.clone(), config_a));
    let b = Arc::new(Engine::new(storage_b.clone(), config_b));
    a.connect(Arc::new(DirectRemote::new(b.clone())))
        .expect("fresh engine");
    b.connect(Arc::new(DirectRemote::new(a.clone())))
        .expect("fresh engine");
    PeerPair {
        a,
        b,
        storage_a,
        storage_b,
    }
}
