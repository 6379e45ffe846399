pub mod node;

use async_trait::async_trait;

use crate::common::error::ProtocolError;
use crate::protocol::message::{Message, NodeId};
use crate::protocol::peers::Peer;

/// Wire unit: a message plus the node that is delivering this particular
/// copy. `from` equals `message.sender` only for direct sends; for gossiped
/// copies it is the relaying peer, and it is what forwarding excludes.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub from: NodeId,
    pub message: Message,
}

/// Point-to-point delivery seam. Implementations are best-effort and
/// unreliable by assumption; callers bound each send with their own timeout
/// and never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, peer: &Peer, envelope: Envelope) -> Result<(), ProtocolError>;
}
