//! Sync session engine.
//!
//! Implements the graph-aware reconciliation algorithm: the four-message
//! handshake, the recursive node walk that lazily fetches ancestors on
//! demand, and the per-graph commit/rollback discipline.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_recursion::async_recursion;

use gasp_core::{Node, NodeResponse, Outpoint, TxId};
use gasp_store::Storage;

use crate::error::{Result, SyncError};
use crate::messages::{InitialReply, InitialRequest, InitialResponse, PROTOCOL_VERSION};
use crate::remote::Remote;

/// Result of a sync session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Graphs pulled from the peer and handed to storage for completion.
    pub pulled: usize,
    /// Tip graphs pushed to the peer.
    pub pushed: usize,
    /// Graphs discarded locally after a failure.
    pub discarded: Vec<Outpoint>,
    /// The peer's watermark as reported in its initial response.
    pub peer_since: u64,
}

/// Configuration for engine behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Watermark sent as `since` in the next initial request. Advanced to
    /// the peer's reported watermark when a session completes.
    pub last_interaction: u64,
    /// Prefix for session flow log lines.
    pub log_prefix: String,
    /// Whether to emit session flow logs.
    pub log: bool,
    /// Pull-only mode: skip the push phase entirely.
    pub unidirectional: bool,
    /// Protocol version spoken by this engine.
    pub version: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            last_interaction: 0,
            log_prefix: "[GASP] ".into(),
            log: false,
            unidirectional: false,
            version: PROTOCOL_VERSION,
        }
    }
}

/// Receiver-side bookkeeping for one graph being pushed to us.
///
/// A submitted `Node` carries no parent pointer, so the receiver remembers
/// which outpoints it asked the pusher for and which node needs each. That
/// record resolves `spent_by` for later submissions and, once drained,
/// marks the graph ready to complete. The appended set deduplicates
/// requests when several nodes share an ancestor.
#[derive(Debug, Default)]
struct PendingSubmission {
    /// Requested outpoint -> the appended node that spends it.
    awaiting: BTreeMap<Outpoint, Outpoint>,
    /// Node identities already appended for this graph.
    appended: BTreeSet<Outpoint>,
}

/// The sync engine: drives sessions against a peer and answers the peer's
/// own protocol operations.
///
/// The remote is late-bound via [`connect`](Engine::connect) so two
/// symmetric engines can hold each other.
pub struct Engine<S: Storage> {
    storage: Arc<S>,
    remote: OnceLock<Arc<dyn Remote>>,
    last_interaction: AtomicU64,
    submissions: Mutex<HashMap<Outpoint, PendingSubmission>>,
    config: EngineConfig,
}

impl<S: Storage> Engine<S> {
    /// Create a new engine. No remote is connected yet.
    pub fn new(storage: Arc<S>, config: EngineConfig) -> Self {
        Self {
            storage,
            remote: OnceLock::new(),
            last_interaction: AtomicU64::new(config.last_interaction),
            submissions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Install the peer endpoint. May be called once.
    pub fn connect(&self, remote: Arc<dyn Remote>) -> Result<()> {
        self.remote
            .set(remote)
            .map_err(|_| SyncError::AlreadyConnected)
    }

    /// The current watermark.
    pub fn last_interaction(&self) -> u64 {
        self.last_interaction.load(Ordering::SeqCst)
    }

    fn remote(&self) -> Result<&Arc<dyn Remote>> {
        self.remote.get().ok_or(SyncError::NotConnected)
    }

    fn log(&self, message: &str) {
        if self.config.log {
            tracing::debug!("{}{}", self.config.log_prefix, message);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operations exposed to a peer
    // ─────────────────────────────────────────────────────────────────────

    /// Answer a peer's initial request with our tips, filtered by its
    /// watermark.
    ///
    /// The version gate runs before any storage access.
    pub async fn get_initial_response(&self, request: InitialRequest) -> Result<InitialResponse> {
        if request.version != self.config.version {
            return Err(SyncError::VersionMismatch {
                current: self.config.version,
                foreign: request.version,
            });
        }
        self.log(&format!(
            "Answering initial request with since={}",
            request.since
        ));
        let utxo_list = self.storage.find_known_utxos(request.since).await?;
        Ok(InitialResponse {
            utxo_list,
            since: self.last_interaction(),
        })
    }

    /// Compute the reply to an initial response: our tips the responder
    /// did not list.
    pub async fn get_initial_reply(&self, response: InitialResponse) -> Result<InitialReply> {
        let mine = self.storage.find_known_utxos(response.since).await?;
        let listed: HashSet<&Outpoint> = response.utxo_list.iter().collect();
        let utxo_list = mine
            .into_iter()
            .filter(|outpoint| !listed.contains(outpoint))
            .collect();
        Ok(InitialReply { utxo_list })
    }

    /// Hydrate a node for a peer that is pulling one of our graphs.
    pub async fn request_node(
        &self,
        graph_id: &Outpoint,
        txid: &TxId,
        output_index: u32,
        metadata: bool,
    ) -> Result<Node> {
        self.log(&format!(
            "Hydrating {}.{} for graph {}",
            txid, output_index, graph_id
        ));
        Ok(self
            .storage
            .hydrate_node(graph_id, txid, output_index, metadata)
            .await?)
    }

    /// Accept a node pushed by a peer.
    ///
    /// Appends it to the graph's temporary state and answers with the
    /// inputs still needed, if any. Once no requested inputs remain
    /// outstanding the graph is validated and finalized. Any failure
    /// discards the graph and surfaces to the pusher.
    pub async fn submit_node(&self, node: Node) -> Result<Option<NodeResponse>> {
        let graph_id = node.graph_id.clone();
        self.log(&format!(
            "Node {} submitted for graph {}",
            node.outpoint(),
            graph_id
        ));
        match self.ingest_submitted_node(node).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!("graph {} rejected during submission: {}", graph_id, e);
                self.submissions.lock().unwrap().remove(&graph_id);
                self.discard_quietly(&graph_id).await;
                Err(SyncError::for_graph(graph_id, e))
            }
        }
    }

    async fn ingest_submitted_node(&self, node: Node) -> Result<Option<NodeResponse>> {
        let outpoint = node.outpoint();
        let graph_id = node.graph_id.clone();

        let spent_by = if outpoint == graph_id {
            None
        } else {
            let mut submissions = self.submissions.lock().unwrap();
            let parent = submissions
                .get_mut(&graph_id)
                .and_then(|pending| pending.awaiting.remove(&outpoint));
            match parent {
                Some(parent) => Some(parent),
                None => {
                    return Err(SyncError::InvalidMessage(format!(
                        "unsolicited node {} for graph {}",
                        outpoint, graph_id
                    )))
                }
            }
        };

        self.storage.append_to_graph(&node, spent_by.as_ref()).await?;
        let needed = self.storage.find_needed_inputs(&node).await?;

        let (response, graph_done) = {
            let mut submissions = self.submissions.lock().unwrap();
            let pending = submissions.entry(graph_id.clone()).or_default();
            pending.appended.insert(outpoint.clone());

            let mut response = NodeResponse::new();
            if let Some(needed) = needed {
                for (input, requested) in needed.requested_inputs {
                    // Shared ancestor already landed for this graph.
                    if pending.appended.contains(&input) {
                        continue;
                    }
                    pending.awaiting.insert(input.clone(), outpoint.clone());
                    response.request(input, requested.metadata);
                }
            }

            if !response.is_empty() {
                (Some(response), false)
            } else if pending.awaiting.is_empty() {
                // Nothing outstanding anywhere in the graph: complete it.
                submissions.remove(&graph_id);
                (None, true)
            } else {
                (None, false)
            }
        };

        if graph_done {
            self.complete_graph(&graph_id).await?;
        }
        Ok(response)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session orchestration
    // ─────────────────────────────────────────────────────────────────────

    /// Run one sync session against the connected remote.
    ///
    /// Pulls the peer's tips we lack, then (unless unidirectional) pushes
    /// our tips the peer lacks. Per-graph failures are logged, the graph
    /// is discarded, and the session continues; only a version mismatch
    /// aborts the whole session.
    pub async fn sync(&self) -> Result<SyncReport> {
        let request = self.build_initial_request();
        self.log(&format!("Starting sync, since={}", request.since));

        let response = match self.remote()?.get_initial_response(request).await {
            Ok(response) => response,
            Err(SyncError::VersionMismatch { current, .. }) => {
                // Re-frame the peer's report from our perspective.
                return Err(SyncError::VersionMismatch {
                    current: self.config.version,
                    foreign: current,
                });
            }
            Err(e) => return Err(e),
        };
        self.log(&format!(
            "Peer listed {} tips, since={}",
            response.utxo_list.len(),
            response.since
        ));

        let mut report = SyncReport {
            peer_since: response.since,
            ..SyncReport::default()
        };

        self.pull_missing_graphs(&response, &mut report).await?;
        if !self.config.unidirectional {
            self.push_missing_graphs(&response, &mut report).await?;
        }

        self.last_interaction.store(response.since, Ordering::SeqCst);
        self.log(&format!(
            "Sync complete: pulled={} pushed={} discarded={}",
            report.pulled,
            report.pushed,
            report.discarded.len()
        ));
        Ok(report)
    }

    /// The initial request this engine would open a session with.
    pub fn build_initial_request(&self) -> InitialRequest {
        InitialRequest {
            version: self.config.version,
            since: self.last_interaction(),
        }
    }

    /// Pull phase: fetch and complete every listed tip we do not know.
    async fn pull_missing_graphs(
        &self,
        response: &InitialResponse,
        report: &mut SyncReport,
    ) -> Result<()> {
        let known: HashSet<Outpoint> = self
            .storage
            .find_known_utxos(0)
            .await?
            .into_iter()
            .collect();

        for tip in &response.utxo_list {
            if known.contains(tip) {
                continue;
            }
            match self.pull_graph(tip).await {
                Ok(()) => report.pulled += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("graph {} failed during pull: {}", tip, e);
                    self.discard_quietly(tip).await;
                    report.discarded.push(tip.clone());
                }
            }
        }
        Ok(())
    }

    async fn pull_graph(&self, tip: &Outpoint) -> Result<()> {
        self.log(&format!("Pulling graph {}", tip));
        let result = async {
            let node = self
                .remote()?
                .request_node(tip, &tip.txid, tip.output_index, true)
                .await?;
            let mut seen = HashSet::new();
            self.process_incoming_node(node, None, &mut seen).await?;
            self.complete_graph(tip).await
        }
        .await;
        result.map_err(|e| SyncError::for_graph(tip.clone(), e))
    }

    /// Walk one incoming node: append it, then recursively fetch whatever
    /// inputs storage still wants.
    ///
    /// `spent_by` is the outpoint of the node that consumes this one; the
    /// tip passes `None`. `seen` is scoped to one root recursion and
    /// bounds descent on cyclic or redundant peer responses.
    #[async_recursion]
    async fn process_incoming_node(
        &self,
        node: Node,
        spent_by: Option<Outpoint>,
        seen: &mut HashSet<Outpoint>,
    ) -> Result<()> {
        let outpoint = node.outpoint();
        if !seen.insert(outpoint.clone()) {
            return Ok(());
        }
        self.log(&format!(
            "Processing incoming node {} (graph {})",
            outpoint, node.graph_id
        ));

        self.storage.append_to_graph(&node, spent_by.as_ref()).await?;
        let Some(needed) = self.storage.find_needed_inputs(&node).await? else {
            return Ok(());
        };

        for (input, requested) in &needed.requested_inputs {
            // Each identity is requested at most once per root recursion;
            // shared ancestors and cycles stop here.
            if seen.contains(input) {
                continue;
            }
            let child = self
                .remote()?
                .request_node(&node.graph_id, &input.txid, input.output_index, requested.metadata)
                .await?;
            self.process_incoming_node(child, Some(outpoint.clone()), seen)
                .await?;
        }
        Ok(())
    }

    /// Push phase: send the peer every tip of ours it did not list.
    async fn push_missing_graphs(
        &self,
        response: &InitialResponse,
        report: &mut SyncReport,
    ) -> Result<()> {
        let reply = self.get_initial_reply(response.clone()).await?;
        self.log(&format!("Pushing {} tips", reply.utxo_list.len()));

        for tip in &reply.utxo_list {
            match self.push_graph(tip).await {
                Ok(()) => report.pushed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // The receiver discards its own temporary state; this
                    // side only abandons the branch.
                    tracing::warn!("graph {} failed during push: {}", tip, e);
                }
            }
        }
        Ok(())
    }

    async fn push_graph(&self, tip: &Outpoint) -> Result<()> {
        self.log(&format!("Pushing graph {}", tip));
        let result = async {
            let node = self
                .storage
                .hydrate_node(tip, &tip.txid, tip.output_index, true)
                .await?;
            let mut seen = HashSet::new();
            self.process_outgoing_node(node, &mut seen).await
        }
        .await;
        result.map_err(|e| SyncError::for_graph(tip.clone(), e))
    }

    /// Walk one outgoing node: submit it, then recursively hydrate and
    /// submit whatever the peer asks for. Never touches local graph state.
    #[async_recursion]
    async fn process_outgoing_node(
        &self,
        node: Node,
        seen: &mut HashSet<Outpoint>,
    ) -> Result<()> {
        let outpoint = node.outpoint();
        if !seen.insert(outpoint) {
            return Ok(());
        }
        let graph_id = node.graph_id.clone();

        let Some(response) = self.remote()?.submit_node(node).await? else {
            return Ok(());
        };
        for (input, requested) in &response.requested_inputs {
            if seen.contains(input) {
                continue;
            }
            let child = self
                .storage
                .hydrate_node(&graph_id, &input.txid, input.output_index, requested.metadata)
                .await?;
            self.process_outgoing_node(child, seen).await?;
        }
        Ok(())
    }

    /// Validate the anchor and promote the temporary graph.
    async fn complete_graph(&self, graph_id: &Outpoint) -> Result<()> {
        self.log(&format!("Completing graph {}", graph_id));
        self.storage.validate_graph_anchor(graph_id).await?;
        self.storage.finalize_graph(graph_id).await?;
        Ok(())
    }

    /// Best-effort discard; failures are logged and swallowed.
    async fn discard_quietly(&self, graph_id: &Outpoint) {
        if let Err(e) = self.storage.discard_graph(graph_id).await {
            tracing::warn!("failed to discard graph {}: {}", graph_id, e);
        }
    }
}
