use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::error::ProtocolError;
use crate::common::hash::{Digest, Hashable};
use crate::network::{Envelope, Transport};

use super::behavior::ProposalBehavior;
use super::detector;
use super::ledger::{Detection, DetectionLedger, LedgerUpdate};
use super::message::{Message, NodeId, Round, Value};
use super::peers::{Peer, PeerRegistry};
use super::store::{RecordOutcome, RoundKey, RoundStore, RoundSummary};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_ROUND_RETENTION: Duration = Duration::from_secs(300);
const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Per-destination delivery window; an elapsed send is abandoned, not retried.
    pub send_timeout: Duration,
    /// Rounds with no observed message for this long are evicted.
    pub round_retention: Duration,
    /// How often the runtime runs retention pruning.
    pub prune_interval: Duration,
    /// Inbound envelope channel capacity.
    pub channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            round_retention: DEFAULT_ROUND_RETENTION,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            channel_capacity: 256,
        }
    }
}

/// Read-only snapshot answering a status query.
#[derive(Clone, Debug, Serialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub is_byzantine: bool,
    pub last_initiated_round: Round,
    pub current_rounds: Vec<RoundSummary>,
    pub peers: Vec<NodeId>,
}

/// All mutable state one node owns, plus the handlers that mutate it.
/// Explicitly constructed and passed around (never ambient), so any number
/// of nodes can coexist in one process.
///
/// Handlers may run concurrently: the round store serializes per
/// (round, sender) entry, the forwarded set's insert is atomic, and the
/// ledger takes its own lock. There is no whole-node lock.
pub struct NodeContext {
    id: NodeId,
    behavior: ProposalBehavior,
    registry: PeerRegistry,
    config: NodeConfig,
    transport: Arc<dyn Transport>,
    store: RoundStore,
    ledger: DetectionLedger,
    /// Instance digests this node has already relayed, with the forward
    /// time for retention pruning. At most one forward per instance, ever.
    forwarded: DashMap<Digest, DateTime<Utc>>,
    /// Rounds this node has initiated; only the initiator numbers its own.
    next_round: AtomicU64,
}

impl NodeContext {
    pub fn new(
        behavior: ProposalBehavior,
        registry: PeerRegistry,
        transport: Arc<dyn Transport>,
        config: NodeConfig,
    ) -> Arc<Self> {
        Arc::new(NodeContext {
            id: registry.local().clone(),
            behavior,
            registry,
            config,
            transport,
            store: RoundStore::new(),
            ledger: DetectionLedger::new(),
            forwarded: DashMap::new(),
            next_round: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Originates a proposal: allocates a fresh round and fans the planned
    /// per-peer values out concurrently, fire-and-forget. The initiator does
    /// not record its own outbound proposal.
    pub fn propose(&self, value: Value) -> Round {
        let round = self.next_round.fetch_add(1, Ordering::SeqCst) + 1;
        let plan = self.behavior.plan(&value, self.registry.peers());
        info!(
            node = %self.id,
            round,
            value = %value,
            peers = plan.len(),
            byzantine = self.behavior.is_byzantine(),
            "proposing",
        );

        let batch: Vec<(Peer, Message)> = plan
            .into_iter()
            .map(|(peer, value)| {
                (
                    peer.clone(),
                    Message::new(self.id.clone(), round, value),
                )
            })
            .collect();
        self.dispatch(batch);
        round
    }

    /// Handles one inbound delivery: validate, record, detect, forward.
    /// Duplicate instances are absorbed silently; a malformed message fails
    /// here without touching any state.
    pub fn handle_receipt(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        let Envelope { from, message } = envelope;
        message.validate()?;

        // Registry membership is configuration, not correctness: unknown
        // senders are flagged but still run through detection.
        if message.sender != self.id && !self.registry.is_member(&message.sender) {
            warn!(node = %self.id, sender = %message.sender, "sender not in peer registry");
        }

        let key = RoundKey::new(message.round, message.sender.clone());
        match self.store.record(key.clone(), &message.value, &from) {
            RecordOutcome::Duplicate => {
                debug!(
                    node = %self.id,
                    sender = %message.sender,
                    round = message.round,
                    "duplicate instance absorbed",
                );
            }
            RecordOutcome::Recorded { distinct_values } => {
                debug!(
                    node = %self.id,
                    sender = %message.sender,
                    round = message.round,
                    value = %message.value,
                    delivered_by = %from,
                    "recorded value",
                );
                if let Some(conflict) = detector::evaluate(&key, &distinct_values) {
                    match self.ledger.upsert(conflict, &self.id) {
                        LedgerUpdate::New(detection) => {
                            info!(
                                node = %self.id,
                                byzantine_node = %detection.byzantine_node,
                                round = detection.round,
                                values = ?detection.conflicting_values,
                                "byzantine fault detected",
                            );
                        }
                        LedgerUpdate::Extended(detection) => {
                            info!(
                                node = %self.id,
                                byzantine_node = %detection.byzantine_node,
                                round = detection.round,
                                values = ?detection.conflicting_values,
                                "conflicting value set grew",
                            );
                        }
                        LedgerUpdate::Unchanged => {}
                    }
                }
            }
        }

        self.maybe_forward(&from, &message);
        Ok(())
    }

    /// Gossip step: relay a not-yet-forwarded instance to every peer except
    /// the one that delivered this copy and any node already on the path.
    fn maybe_forward(&self, from: &NodeId, message: &Message) {
        let digest = message.hash();
        if self.forwarded.contains_key(&digest) {
            return;
        }

        let relay = message.forwarded(&self.id);
        let batch: Vec<(Peer, Message)> = self
            .registry
            .peers_excluding(from)
            .into_iter()
            .filter(|peer| !message.traversed(&peer.id))
            .map(|peer| (peer.clone(), relay.clone()))
            .collect();
        if batch.is_empty() {
            return;
        }

        // A concurrent duplicate delivery may have won the race to forward.
        if self.forwarded.insert(digest, Utc::now()).is_some() {
            return;
        }

        debug!(
            node = %self.id,
            sender = %message.sender,
            round = message.round,
            targets = batch.len(),
            "forwarding",
        );
        self.dispatch(batch);
    }

    /// Launch-all, await-best-effort fan-out: one task per destination, each
    /// bounded by the send timeout. One peer's failure never delays or fails
    /// the others, and nothing is rolled back on failure.
    fn dispatch(&self, batch: Vec<(Peer, Message)>) {
        for (peer, message) in batch {
            let transport = Arc::clone(&self.transport);
            let from = self.id.clone();
            let timeout = self.config.send_timeout;
            tokio::spawn(async move {
                let envelope = Envelope {
                    from: from.clone(),
                    message,
                };
                match tokio::time::timeout(timeout, transport.send(&peer, envelope)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(node = %from, peer = %peer.id, %err, "send failed");
                    }
                    Err(_) => {
                        let err = ProtocolError::SendTimeout {
                            peer: peer.id.as_str().to_string(),
                            timeout_ms: timeout.as_millis() as u64,
                        };
                        warn!(node = %from, peer = %peer.id, %err, "send timed out");
                    }
                }
            });
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.id.clone(),
            is_byzantine: self.behavior.is_byzantine(),
            last_initiated_round: self.next_round.load(Ordering::SeqCst),
            current_rounds: self.store.summaries(),
            peers: self
                .registry
                .peers()
                .iter()
                .map(|peer| peer.id.clone())
                .collect(),
        }
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.ledger.all()
    }

    pub fn detection_count(&self) -> usize {
        self.ledger.count()
    }

    /// Retention pass: drops rounds (and their forwarded-instance digests)
    /// idle beyond the configured window. The detection ledger never shrinks.
    pub fn prune_expired(&self) {
        let retention = chrono::Duration::from_std(self.config.round_retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_ROUND_RETENTION.as_secs() as i64));
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return;
        };
        let evicted = self.store.prune_idle_since(cutoff);
        self.forwarded.retain(|_, forwarded_at| *forwarded_at >= cutoff);
        if evicted > 0 {
            debug!(node = %self.id, evicted, "pruned idle rounds");
        }
    }
}
