use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{
    error::ProtocolError,
    hash::{digest_fields, Digest, Hashable},
};

/// Opaque node identifier, unique across the cluster and fixed for the
/// process lifetime.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

/// Scopes one proposal instance. Allocated per-initiator by a monotonic
/// counter; created implicitly everywhere else the first time a message
/// bearing it is observed.
pub type Round = u64;

/// Opaque proposal payload.
pub type Value = String;

/// A proposal in flight. `path` records every node the message has
/// traversed, originating sender first, and grows by one hop per forward.
///
/// Two messages are the same *instance* when sender, round and value all
/// match; `path` is provenance, not identity.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Message {
    pub sender: NodeId,
    pub round: Round,
    pub value: Value,
    pub path: Vec<NodeId>,
}

impl Message {
    /// A freshly originated proposal: the path starts at the sender.
    pub fn new(sender: NodeId, round: Round, value: Value) -> Self {
        let path = vec![sender.clone()];
        Message {
            sender,
            round,
            value,
            path,
        }
    }

    /// The copy `via` relays onward; identity unchanged, one more hop on
    /// the path.
    pub fn forwarded(&self, via: &NodeId) -> Self {
        let mut forwarded = self.clone();
        forwarded.path.push(via.clone());
        forwarded
    }

    /// Boundary validation. Rejected messages never reach the round store.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.sender.as_str().is_empty() {
            return Err(self.malformed("empty sender id"));
        }
        if self.path.is_empty() {
            return Err(self.malformed("empty path"));
        }
        if self.path[0] != self.sender {
            return Err(self.malformed("path does not start at sender"));
        }
        Ok(())
    }

    pub fn traversed(&self, node: &NodeId) -> bool {
        self.path.contains(node)
    }

    fn malformed(&self, reason: &str) -> ProtocolError {
        ProtocolError::MalformedMessage {
            sender: self.sender.as_str().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Hashable for Message {
    fn hash(&self) -> Digest {
        let round = self.round.to_be_bytes();
        digest_fields([
            self.sender.as_str().as_bytes(),
            round.as_ref(),
            self.value.as_bytes(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_path_starts_at_sender() {
        let msg = Message::new(NodeId::from("node1"), 1, "tx1".to_string());
        assert_eq!(msg.path, vec![NodeId::from("node1")]);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_forwarding_appends_hop_keeps_identity() {
        let msg = Message::new(NodeId::from("node1"), 1, "tx1".to_string());
        let relayed = msg.forwarded(&NodeId::from("node2"));

        assert_eq!(relayed.sender, msg.sender);
        assert_eq!(relayed.round, msg.round);
        assert_eq!(relayed.value, msg.value);
        assert_eq!(
            relayed.path,
            vec![NodeId::from("node1"), NodeId::from("node2")]
        );
        assert_eq!(relayed.hash(), msg.hash());
        assert!(relayed.traversed(&NodeId::from("node2")));
    }

    #[test]
    fn test_validate_rejects_inconsistent_path() {
        let mut msg = Message::new(NodeId::from("node1"), 1, "tx1".to_string());
        msg.path = vec![NodeId::from("node2")];
        assert!(msg.validate().is_err());

        msg.path = vec![];
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_instance_identity_distinguishes_value_and_round() {
        let a = Message::new(NodeId::from("node4"), 7, "A".to_string());
        let b = Message::new(NodeId::from("node4"), 7, "B".to_string());
        let c = Message::new(NodeId::from("node4"), 8, "A".to_string());
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }
}
