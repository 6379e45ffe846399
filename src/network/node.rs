use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::common::error::ProtocolError;
use crate::protocol::behavior::ProposalBehavior;
use crate::protocol::ledger::Detection;
use crate::protocol::message::{NodeId, Round, Value};
use crate::protocol::peers::{Peer, PeerRegistry};
use crate::protocol::processor::{NodeConfig, NodeContext, NodeStatus};

use super::{Envelope, Transport};

/// In-process transport: envelopes travel over bounded mpsc channels keyed
/// by peer address. One shared instance routes for a whole cluster.
#[derive(Default)]
pub struct ChannelTransport {
    routes: DashMap<String, Sender<Envelope>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        ChannelTransport {
            routes: DashMap::new(),
        }
    }

    pub fn add_route(&self, addr: &str, inbox: Sender<Envelope>) {
        self.routes.insert(addr.to_string(), inbox);
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, peer: &Peer, envelope: Envelope) -> Result<(), ProtocolError> {
        let inbox = self
            .routes
            .get(&peer.addr)
            .ok_or_else(|| ProtocolError::NoRoute {
                addr: peer.addr.clone(),
            })?
            .value()
            .clone();
        inbox
            .send(envelope)
            .await
            .map_err(|_| ProtocolError::SendFailed {
                peer: peer.id.as_str().to_string(),
                reason: "inbox closed".to_string(),
            })
    }
}

/// Handle onto a running node: the transport-agnostic operations. Cloneable
/// and cheap; the node keeps running until its `Node` is shut down.
#[derive(Clone)]
pub struct NodeHandle {
    context: Arc<NodeContext>,
}

impl NodeHandle {
    pub fn id(&self) -> &NodeId {
        self.context.id()
    }

    pub fn propose(&self, value: Value) -> Round {
        self.context.propose(value)
    }

    /// Direct delivery, bypassing the inbox. Used by tests and by any
    /// transport adapter that already has the envelope decoded.
    pub fn receive(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.context.handle_receipt(envelope)
    }

    pub fn status(&self) -> NodeStatus {
        self.context.status()
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.context.detections()
    }

    pub fn detection_count(&self) -> usize {
        self.context.detection_count()
    }
}

/// A node runtime: drains the inbox, handling each envelope on its own task
/// so one slow delivery never blocks the rest, and runs retention pruning on
/// an interval.
pub struct Node {
    context: Arc<NodeContext>,
    runtime: JoinHandle<()>,
}

impl Node {
    pub fn spawn(context: Arc<NodeContext>, mut inbox: Receiver<Envelope>) -> Self {
        let loop_context = Arc::clone(&context);
        let prune_interval = context.config().prune_interval;
        let runtime = tokio::spawn(async move {
            let mut prune = tokio::time::interval(prune_interval);
            prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    delivery = inbox.recv() => match delivery {
                        Some(envelope) => {
                            let handler = Arc::clone(&loop_context);
                            tokio::spawn(async move {
                                if let Err(err) = handler.handle_receipt(envelope) {
                                    warn!(node = %handler.id(), %err, "rejected inbound message");
                                }
                            });
                        }
                        None => {
                            debug!(node = %loop_context.id(), "inbox closed, runtime stopping");
                            break;
                        }
                    },
                    _ = prune.tick() => loop_context.prune_expired(),
                }
            }
        });
        Node { context, runtime }
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            context: Arc::clone(&self.context),
        }
    }

    pub fn shutdown(self) {
        self.runtime.abort();
    }
}

/// A whole cluster wired over one channel transport, for the demo binary
/// and integration tests. Every node knows every other node; the topology
/// is fully connected and static.
pub struct Cluster {
    nodes: Vec<Node>,
}

impl Cluster {
    /// Builds and starts one node per `(id, behavior)` entry. Node ids must
    /// be unique; each node's registry lists all the others in entry order.
    pub fn build(
        specs: &[(&str, ProposalBehavior)],
        config: NodeConfig,
    ) -> Result<Self, ProtocolError> {
        // A repeated id would otherwise vanish from every registry's member
        // list and overwrite the first node's inbox route.
        for (i, (id, _)) in specs.iter().enumerate() {
            if specs[..i].iter().any(|(other, _)| other == id) {
                return Err(ProtocolError::InvalidConfig(format!(
                    "duplicate node id {id}"
                )));
            }
        }

        let transport = Arc::new(ChannelTransport::new());

        let mut inboxes = Vec::with_capacity(specs.len());
        for (id, _) in specs {
            let (tx, rx) = mpsc::channel(config.channel_capacity);
            transport.add_route(&cluster_addr(id), tx);
            inboxes.push(rx);
        }

        let mut nodes = Vec::with_capacity(specs.len());
        for ((id, behavior), inbox) in specs.iter().zip(inboxes) {
            let members = specs
                .iter()
                .filter(|(other, _)| other != id)
                .map(|(other, _)| Peer::new(*other, cluster_addr(other)))
                .collect();
            let registry = PeerRegistry::new(NodeId::from(*id), members)?;
            let context = NodeContext::new(
                *behavior,
                registry,
                Arc::clone(&transport) as Arc<dyn Transport>,
                config.clone(),
            );
            nodes.push(Node::spawn(context, inbox));
        }

        Ok(Cluster { nodes })
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.nodes.iter().map(Node::handle).collect()
    }

    pub fn handle(&self, id: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|node| node.context.id().as_str() == id)
            .map(Node::handle)
    }

    pub fn shutdown(self) {
        for node in self.nodes {
            node.shutdown();
        }
    }
}

fn cluster_addr(id: &str) -> String {
    format!("mem://{id}")
}
