//! In-memory implementation of the Storage trait.
//!
//! This is primarily for testing. It has the semantics a persistent
//! backend must provide, but keeps everything in memory and additionally
//! journals every contract call so protocol tests can assert call
//! sequences.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use gasp_core::{InputHint, Node, NodeResponse, Outpoint, TxId};

use crate::error::{Result, StoreError};
use crate::traits::Storage;

/// Default bound on temporary graph size.
pub const DEFAULT_MAX_GRAPH_NODES: usize = 10_000;

/// A structured transaction record held by the store.
///
/// Because transaction parsing lives outside this crate, the store keeps
/// the facts it needs (input outpoints, proof, metadata) alongside the
/// opaque bytes instead of deriving them.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub raw_tx: Bytes,
    /// Input outpoints declared by the transaction.
    pub inputs: Vec<Outpoint>,
    /// Chain-inclusion proof, if mined.
    pub proof: Option<String>,
    pub tx_metadata: Option<String>,
    pub output_metadata: Option<String>,
}

impl TxRecord {
    /// The txid of the record's raw bytes.
    pub fn txid(&self) -> TxId {
        TxId::of(&self.raw_tx)
    }
}

/// One call into the Storage contract, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    FindKnownUtxos {
        since: u64,
    },
    HydrateNode {
        graph_id: Outpoint,
        outpoint: Outpoint,
    },
    FindNeededInputs {
        outpoint: Outpoint,
    },
    AppendToGraph {
        graph_id: Outpoint,
        outpoint: Outpoint,
        spent_by: Option<Outpoint>,
    },
    ValidateGraphAnchor {
        graph_id: Outpoint,
    },
    DiscardGraph {
        graph_id: Outpoint,
    },
    FinalizeGraph {
        graph_id: Outpoint,
    },
}

struct TempNode {
    node: Node,
    spent_by: Option<Outpoint>,
}

#[derive(Default)]
struct TempGraph {
    nodes: BTreeMap<Outpoint, TempNode>,
}

struct MemoryStorageInner {
    /// Known transactions by id.
    txs: HashMap<TxId, TxRecord>,

    /// Known UTXO set with optional timestamps (None = unconfirmed).
    utxos: BTreeMap<Outpoint, Option<u64>>,

    /// Temporary graphs being assembled during a sync.
    graphs: HashMap<Outpoint, TempGraph>,

    /// Timestamp stamped onto finalized tips. None leaves them unconfirmed.
    clock: Option<u64>,

    /// Test hook: fail every anchor validation.
    reject_anchors: bool,
}

/// In-memory storage implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStorage {
    inner: RwLock<MemoryStorageInner>,
    journal: Mutex<Vec<StorageEvent>>,
    max_graph_nodes: usize,
}

impl MemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_max_graph_nodes(DEFAULT_MAX_GRAPH_NODES)
    }

    /// Create a store with a custom bound on temporary graph size.
    pub fn with_max_graph_nodes(max_graph_nodes: usize) -> Self {
        Self {
            inner: RwLock::new(MemoryStorageInner {
                txs: HashMap::new(),
                utxos: BTreeMap::new(),
                graphs: HashMap::new(),
                clock: None,
                reject_anchors: false,
            }),
            journal: Mutex::new(Vec::new()),
            max_graph_nodes,
        }
    }

    /// Insert a known transaction.
    pub fn insert_tx(&self, record: TxRecord) -> TxId {
        let txid = record.txid();
        self.inner.write().unwrap().txs.insert(txid, record);
        txid
    }

    /// Mark an outpoint as a known UTXO.
    pub fn insert_utxo(&self, outpoint: Outpoint, time: Option<u64>) {
        self.inner.write().unwrap().utxos.insert(outpoint, time);
    }

    /// Set the timestamp stamped onto subsequently finalized tips.
    pub fn set_clock(&self, time: u64) {
        self.inner.write().unwrap().clock = Some(time);
    }

    /// Force every anchor validation to fail.
    pub fn reject_anchors(&self, reject: bool) {
        self.inner.write().unwrap().reject_anchors = reject;
    }

    /// Snapshot of the known UTXO set, in outpoint order.
    pub fn known_utxos(&self) -> Vec<Outpoint> {
        self.inner.read().unwrap().utxos.keys().cloned().collect()
    }

    /// Whether a known transaction with this id is held.
    pub fn knows_tx(&self, txid: &TxId) -> bool {
        self.inner.read().unwrap().txs.contains_key(txid)
    }

    /// Whether a temporary graph currently exists.
    pub fn has_temporary_graph(&self, graph_id: &Outpoint) -> bool {
        self.inner.read().unwrap().graphs.contains_key(graph_id)
    }

    /// Number of nodes currently in a temporary graph.
    pub fn temporary_graph_len(&self, graph_id: &Outpoint) -> usize {
        self.inner
            .read()
            .unwrap()
            .graphs
            .get(graph_id)
            .map(|g| g.nodes.len())
            .unwrap_or(0)
    }

    /// The nodes of a temporary graph with the spender each was appended
    /// under, in outpoint order.
    pub fn temporary_graph_edges(
        &self,
        graph_id: &Outpoint,
    ) -> Vec<(Outpoint, Option<Outpoint>)> {
        self.inner
            .read()
            .unwrap()
            .graphs
            .get(graph_id)
            .map(|g| {
                g.nodes
                    .iter()
                    .map(|(outpoint, temp)| (outpoint.clone(), temp.spent_by.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The journal of all contract calls made so far.
    pub fn events(&self) -> Vec<StorageEvent> {
        self.journal.lock().unwrap().clone()
    }

    /// Clear the call journal.
    pub fn clear_events(&self) {
        self.journal.lock().unwrap().clear();
    }

    fn record(&self, event: StorageEvent) {
        self.journal.lock().unwrap().push(event);
    }

    /// Digest of a held transaction, as advertised in input hints.
    fn refresh_digest(record: &TxRecord) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&record.raw_tx);
        if let Some(meta) = &record.tx_metadata {
            hasher.update(meta.as_bytes());
        }
        if let Some(meta) = &record.output_metadata {
            hasher.update(meta.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_known_utxos(&self, since: u64) -> Result<Vec<Outpoint>> {
        self.record(StorageEvent::FindKnownUtxos { since });
        let inner = self.inner.read().unwrap();
        Ok(inner
            .utxos
            .iter()
            .filter(|(_, time)| time.map_or(true, |t| t > since))
            .map(|(outpoint, _)| outpoint.clone())
            .collect())
    }

    async fn hydrate_node(
        &self,
        graph_id: &Outpoint,
        txid: &TxId,
        output_index: u32,
        metadata: bool,
    ) -> Result<Node> {
        let outpoint = Outpoint::new(*txid, output_index);
        self.record(StorageEvent::HydrateNode {
            graph_id: graph_id.clone(),
            outpoint: outpoint.clone(),
        });

        let inner = self.inner.read().unwrap();
        let record = inner
            .txs
            .get(txid)
            .ok_or_else(|| StoreError::NotFound(outpoint.encode36()))?;

        let inputs = metadata.then(|| {
            record
                .inputs
                .iter()
                .map(|input| {
                    let hash = inner
                        .txs
                        .get(&input.txid)
                        .map(Self::refresh_digest)
                        .unwrap_or_default();
                    (input.clone(), InputHint { hash })
                })
                .collect::<BTreeMap<_, _>>()
        });

        Ok(Node {
            graph_id: graph_id.clone(),
            raw_tx: record.raw_tx.clone(),
            output_index,
            proof: record.proof.clone(),
            tx_metadata: metadata.then(|| record.tx_metadata.clone()).flatten(),
            output_metadata: metadata.then(|| record.output_metadata.clone()).flatten(),
            inputs,
        })
    }

    async fn find_needed_inputs(&self, node: &Node) -> Result<Option<NodeResponse>> {
        self.record(StorageEvent::FindNeededInputs {
            outpoint: node.outpoint(),
        });

        // A chain-proven node is a frontier leaf; its ancestors are not
        // needed for anchor validity.
        if node.proof.is_some() {
            return Ok(None);
        }
        let Some(inputs) = &node.inputs else {
            return Ok(None);
        };

        let inner = self.inner.read().unwrap();
        let mut response = NodeResponse::new();
        for (input, hint) in inputs {
            let needed = match inner.txs.get(&input.txid) {
                None => true,
                // A differing digest means the sender holds a fresher copy.
                Some(record) => {
                    !hint.hash.is_empty() && Self::refresh_digest(record) != hint.hash
                }
            };
            if needed {
                response.request(input.clone(), true);
            }
        }

        Ok((!response.is_empty()).then_some(response))
    }

    async fn append_to_graph(&self, node: &Node, spent_by: Option<&Outpoint>) -> Result<()> {
        let outpoint = node.outpoint();
        self.record(StorageEvent::AppendToGraph {
            graph_id: node.graph_id.clone(),
            outpoint: outpoint.clone(),
            spent_by: spent_by.cloned(),
        });

        let mut inner = self.inner.write().unwrap();
        match spent_by {
            // The root append must be the tip itself.
            None if outpoint != node.graph_id => {
                return Err(StoreError::Unwanted {
                    graph_id: node.graph_id.clone(),
                })
            }
            // An ancestor append requires an existing root.
            Some(_) if !inner.graphs.contains_key(&node.graph_id) => {
                return Err(StoreError::Unwanted {
                    graph_id: node.graph_id.clone(),
                })
            }
            _ => {}
        }

        let graph = inner.graphs.entry(node.graph_id.clone()).or_default();
        if !graph.nodes.contains_key(&outpoint) && graph.nodes.len() >= self.max_graph_nodes {
            return Err(StoreError::TooLarge {
                graph_id: node.graph_id.clone(),
                limit: self.max_graph_nodes,
            });
        }

        graph.nodes.insert(
            outpoint,
            TempNode {
                node: node.clone(),
                spent_by: spent_by.cloned(),
            },
        );
        Ok(())
    }

    async fn validate_graph_anchor(&self, graph_id: &Outpoint) -> Result<()> {
        self.record(StorageEvent::ValidateGraphAnchor {
            graph_id: graph_id.clone(),
        });

        let inner = self.inner.read().unwrap();
        if inner.reject_anchors {
            return Err(StoreError::AnchorInvalid {
                graph_id: graph_id.clone(),
                reason: "rejected by policy".into(),
            });
        }
        let graph = inner
            .graphs
            .get(graph_id)
            .ok_or_else(|| StoreError::AnchorInvalid {
                graph_id: graph_id.clone(),
                reason: "no temporary graph".into(),
            })?;

        // A node is anchored if it is chain-proven, already trusted, or
        // every one of its declared inputs is grounded: either an anchored
        // node of this graph, or a transaction we already trust (which is
        // why it was never fetched). Propagate to a fixpoint; cycles never
        // bootstrap, so a graph that only references itself cannot anchor.
        let mut anchored: HashSet<Outpoint> = HashSet::new();
        loop {
            let mut changed = false;
            for (outpoint, temp) in &graph.nodes {
                if anchored.contains(outpoint) {
                    continue;
                }
                let grounded = temp.node.proof.is_some()
                    || inner.txs.contains_key(&outpoint.txid)
                    || temp.node.inputs.as_ref().map_or(false, |inputs| {
                        !inputs.is_empty()
                            && inputs.keys().all(|input| {
                                anchored.contains(input)
                                    || inner.txs.contains_key(&input.txid)
                            })
                    });
                if grounded {
                    anchored.insert(outpoint.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        if !anchored.contains(graph_id) {
            return Err(StoreError::AnchorInvalid {
                graph_id: graph_id.clone(),
                reason: "tip ancestry does not ground out in proof or trust".into(),
            });
        }
        Ok(())
    }

    async fn discard_graph(&self, graph_id: &Outpoint) -> Result<()> {
        self.record(StorageEvent::DiscardGraph {
            graph_id: graph_id.clone(),
        });
        self.inner.write().unwrap().graphs.remove(graph_id);
        Ok(())
    }

    async fn finalize_graph(&self, graph_id: &Outpoint) -> Result<()> {
        self.record(StorageEvent::FinalizeGraph {
            graph_id: graph_id.clone(),
        });

        let mut inner = self.inner.write().unwrap();
        let graph = inner.graphs.remove(graph_id).ok_or_else(|| {
            StoreError::Backend(format!("finalize of unknown graph {}", graph_id))
        })?;

        for temp in graph.nodes.into_values() {
            let txid = TxId::of(&temp.node.raw_tx);
            let record = TxRecord {
                raw_tx: temp.node.raw_tx,
                inputs: temp
                    .node
                    .inputs
                    .map(|inputs| inputs.into_keys().collect())
                    .unwrap_or_default(),
                proof: temp.node.proof,
                tx_metadata: temp.node.tx_metadata,
                output_metadata: temp.node.output_metadata,
            };
            inner.txs.insert(txid, record);
        }
        let time = inner.clock;
        inner.utxos.insert(graph_id.clone(), time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(name: &str, inputs: Vec<Outpoint>, proof: bool) -> TxRecord {
        TxRecord {
            raw_tx: Bytes::from(format!("rawtx:{name}")),
            inputs,
            proof: proof.then(|| format!("proof:{name}")),
            tx_metadata: None,
            output_metadata: None,
        }
    }

    fn tip_node(record: &TxRecord, output_index: u32) -> Node {
        let outpoint = Outpoint::new(record.txid(), output_index);
        Node {
            graph_id: outpoint,
            raw_tx: record.raw_tx.clone(),
            output_index,
            proof: record.proof.clone(),
            tx_metadata: None,
            output_metadata: None,
            inputs: None,
        }
    }

    #[tokio::test]
    async fn test_find_known_utxos_since_filter() {
        let store = MemoryStorage::new();
        let old = Outpoint::new(TxId::of(b"rawtx:old"), 0);
        let new = Outpoint::new(TxId::of(b"rawtx:new"), 0);
        let untimed = Outpoint::new(TxId::of(b"rawtx:untimed"), 0);
        store.insert_utxo(old.clone(), Some(100));
        store.insert_utxo(new.clone(), Some(200));
        store.insert_utxo(untimed.clone(), None);

        let found = store.find_known_utxos(150).await.unwrap();
        assert!(found.contains(&new));
        assert!(found.contains(&untimed));
        assert!(!found.contains(&old));

        let all = store.find_known_utxos(0).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_hydrate_unknown_is_not_found() {
        let store = MemoryStorage::new();
        let outpoint = Outpoint::new(TxId::of(b"rawtx:missing"), 0);
        let err = store
            .hydrate_node(&outpoint, &outpoint.txid, 0, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_hydrate_metadata_gates_inputs() {
        let store = MemoryStorage::new();
        let parent = tx("parent", vec![], true);
        let parent_out = Outpoint::new(parent.txid(), 0);
        store.insert_tx(parent);
        let child = tx("child", vec![parent_out.clone()], false);
        let child_out = Outpoint::new(child.txid(), 0);
        store.insert_tx(child);

        let bare = store
            .hydrate_node(&child_out, &child_out.txid, 0, false)
            .await
            .unwrap();
        assert!(bare.inputs.is_none());

        let full = store
            .hydrate_node(&child_out, &child_out.txid, 0, true)
            .await
            .unwrap();
        let inputs = full.inputs.unwrap();
        assert!(inputs.contains_key(&parent_out));
        assert!(!inputs[&parent_out].hash.is_empty());
    }

    #[tokio::test]
    async fn test_needed_inputs_policy() {
        let store = MemoryStorage::new();
        let parent = tx("parent", vec![], true);
        let parent_out = Outpoint::new(parent.txid(), 0);
        let child = tx("child", vec![parent_out.clone()], false);

        // Unproven node with an unknown input: the input is needed.
        let mut node = tip_node(&child, 0);
        node.inputs = Some(BTreeMap::from([(
            parent_out.clone(),
            InputHint { hash: String::new() },
        )]));
        let needed = store.find_needed_inputs(&node).await.unwrap().unwrap();
        assert!(needed.requested_inputs.contains_key(&parent_out));

        // Once the input is held with a matching digest, nothing is needed.
        store.insert_tx(parent.clone());
        node.inputs = Some(BTreeMap::from([(
            parent_out.clone(),
            InputHint {
                hash: MemoryStorage::refresh_digest(&parent),
            },
        )]));
        assert!(store.find_needed_inputs(&node).await.unwrap().is_none());

        // A differing digest asks for a refresh.
        node.inputs = Some(BTreeMap::from([(
            parent_out.clone(),
            InputHint {
                hash: "somethingelse".into(),
            },
        )]));
        assert!(store.find_needed_inputs(&node).await.unwrap().is_some());

        // A proven node needs nothing regardless.
        node.proof = Some("proof:child".into());
        assert!(store.find_needed_inputs(&node).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let store = MemoryStorage::new();
        let record = tx("tip", vec![], true);
        let node = tip_node(&record, 0);

        store.append_to_graph(&node, None).await.unwrap();
        store.append_to_graph(&node, None).await.unwrap();
        assert_eq!(store.temporary_graph_len(&node.graph_id), 1);
    }

    #[tokio::test]
    async fn test_append_rejects_mismatched_root() {
        let store = MemoryStorage::new();
        let record = tx("tip", vec![], true);
        let mut node = tip_node(&record, 0);
        node.graph_id = Outpoint::new(TxId::of(b"rawtx:other"), 0);

        let err = store.append_to_graph(&node, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Unwanted { .. }));
    }

    #[tokio::test]
    async fn test_append_rejects_orphan_ancestor() {
        let store = MemoryStorage::new();
        let record = tx("ancestor", vec![], true);
        let mut node = tip_node(&record, 0);
        let tip = Outpoint::new(TxId::of(b"rawtx:tip"), 0);
        node.graph_id = tip.clone();

        let err = store.append_to_graph(&node, Some(&tip)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unwanted { .. }));
    }

    #[tokio::test]
    async fn test_append_enforces_graph_bound() {
        let store = MemoryStorage::with_max_graph_nodes(1);
        let tip_record = tx("tip", vec![], false);
        let tip = tip_node(&tip_record, 0);
        store.append_to_graph(&tip, None).await.unwrap();

        let ancestor_record = tx("ancestor", vec![], true);
        let mut ancestor = tip_node(&ancestor_record, 0);
        ancestor.graph_id = tip.graph_id.clone();
        let err = store
            .append_to_graph(&ancestor, Some(&tip.graph_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 1, .. }));
    }

    #[tokio::test]
    async fn test_anchor_validation() {
        let store = MemoryStorage::new();

        // Proven frontier: valid.
        let proven = tx("proven", vec![], true);
        let node = tip_node(&proven, 0);
        store.append_to_graph(&node, None).await.unwrap();
        store.validate_graph_anchor(&node.graph_id).await.unwrap();

        // Unproven, untrusted frontier: invalid.
        let bare = tx("bare", vec![], false);
        let node = tip_node(&bare, 0);
        store.append_to_graph(&node, None).await.unwrap();
        let err = store
            .validate_graph_anchor(&node.graph_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AnchorInvalid { .. }));

        // Unproven but already trusted: valid.
        store.insert_tx(bare.clone());
        store.validate_graph_anchor(&node.graph_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_anchor_propagates_through_chain() {
        let store = MemoryStorage::new();
        let leaf = tx("leaf", vec![], true);
        let leaf_out = Outpoint::new(leaf.txid(), 0);
        let mid = tx("mid", vec![leaf_out.clone()], false);
        let mid_out = Outpoint::new(mid.txid(), 0);
        let tip_record = tx("tip", vec![mid_out.clone()], false);
        let tip = tip_node(&tip_record, 0);

        let with_inputs = |record: &TxRecord, graph_id: &Outpoint| {
            let mut node = tip_node(record, 0);
            node.graph_id = graph_id.clone();
            node.inputs = Some(
                record
                    .inputs
                    .iter()
                    .map(|input| (input.clone(), InputHint { hash: String::new() }))
                    .collect(),
            );
            node
        };

        let tip_with_inputs = with_inputs(&tip_record, &tip.graph_id);
        store.append_to_graph(&tip_with_inputs, None).await.unwrap();
        let mid_node = with_inputs(&mid, &tip.graph_id);
        store
            .append_to_graph(&mid_node, Some(&tip.graph_id))
            .await
            .unwrap();

        // The chain does not yet ground out: the proven leaf is missing.
        assert!(store.validate_graph_anchor(&tip.graph_id).await.is_err());

        let leaf_node = with_inputs(&leaf, &tip.graph_id);
        store
            .append_to_graph(&leaf_node, Some(&mid_out))
            .await
            .unwrap();
        store.validate_graph_anchor(&tip.graph_id).await.unwrap();

        // The spender edges were wired as appended.
        let edges = store.temporary_graph_edges(&tip.graph_id);
        assert!(edges.contains(&(tip.graph_id.clone(), None)));
        assert!(edges.contains(&(mid_out, Some(tip.graph_id.clone()))));
    }

    #[tokio::test]
    async fn test_self_referential_graph_cannot_anchor() {
        let store = MemoryStorage::new();
        let record = tx("loop", vec![], false);
        let mut node = tip_node(&record, 0);
        node.inputs = Some(BTreeMap::from([(
            node.graph_id.clone(),
            InputHint { hash: String::new() },
        )]));

        store.append_to_graph(&node, None).await.unwrap();
        let err = store
            .validate_graph_anchor(&node.graph_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AnchorInvalid { .. }));
    }

    #[tokio::test]
    async fn test_reject_anchors_hook() {
        let store = MemoryStorage::new();
        store.reject_anchors(true);
        let record = tx("tip", vec![], true);
        let node = tip_node(&record, 0);
        store.append_to_graph(&node, None).await.unwrap();
        assert!(store.validate_graph_anchor(&node.graph_id).await.is_err());
    }

    #[tokio::test]
    async fn test_finalize_promotes_graph() {
        let store = MemoryStorage::new();
        store.set_clock(500);
        let record = tx("tip", vec![], true);
        let node = tip_node(&record, 0);
        store.append_to_graph(&node, None).await.unwrap();
        store.finalize_graph(&node.graph_id).await.unwrap();

        assert!(!store.has_temporary_graph(&node.graph_id));
        assert!(store.knows_tx(&node.graph_id.txid));
        assert_eq!(store.known_utxos(), vec![node.graph_id.clone()]);
        // Stamped with the clock, so a later `since` filters it out.
        assert!(store.find_known_utxos(500).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discard_is_best_effort() {
        let store = MemoryStorage::new();
        let ghost = Outpoint::new(TxId::of(b"rawtx:ghost"), 0);
        store.discard_graph(&ghost).await.unwrap();
    }
}
