use serde::{Deserialize, Serialize};

use crate::common::error::ProtocolError;
use super::message::NodeId;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Peer {
    pub id: NodeId,
    pub addr: String,
}

impl Peer {
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Peer {
            id: NodeId::new(id),
            addr: addr.into(),
        }
    }
}

/// The static peer set one node knows about. Read-only after construction;
/// iteration order is the configured registry order, which the Byzantine
/// split relies on being deterministic.
#[derive(Clone, Debug)]
pub struct PeerRegistry {
    local: NodeId,
    members: Vec<Peer>,
}

impl PeerRegistry {
    /// Validates the configuration up front: a duplicate id or a peer entry
    /// for the local node itself is a fatal startup error.
    pub fn new(local: NodeId, members: Vec<Peer>) -> Result<Self, ProtocolError> {
        for (i, peer) in members.iter().enumerate() {
            if peer.id == local {
                return Err(ProtocolError::InvalidConfig(format!(
                    "peer list contains the local node {local}"
                )));
            }
            if members[..i].iter().any(|other| other.id == peer.id) {
                return Err(ProtocolError::InvalidConfig(format!(
                    "duplicate peer id {}",
                    peer.id
                )));
            }
        }
        Ok(PeerRegistry { local, members })
    }

    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// All peers, registry order.
    pub fn peers(&self) -> &[Peer] {
        &self.members
    }

    /// Registry-order peers minus one node, used for fan-out and for
    /// forwarding exclusion.
    pub fn peers_excluding(&self, excluded: &NodeId) -> Vec<&Peer> {
        self.members
            .iter()
            .filter(|peer| &peer.id != excluded)
            .collect()
    }

    pub fn is_member(&self, id: &NodeId) -> bool {
        self.members.iter().any(|peer| &peer.id == id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
