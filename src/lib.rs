//! Equivocation detection over point-to-point gossip.
//!
//! A fixed cluster of nodes exchanges proposed values scoped by round.
//! Every node records each (round, sender, value) it observes, relays new
//! instances to peers it has no reason to think already hold them, and
//! flags any sender seen asserting two distinct values under the same
//! round. Detection is local and order-independent: no quorum, no
//! signatures, no tolerance of the fault, just evidence of it.

pub mod common;
pub mod network;
pub mod protocol;

pub use common::error::ProtocolError;
pub use network::node::{ChannelTransport, Cluster, Node, NodeHandle};
pub use network::{Envelope, Transport};
pub use protocol::behavior::ProposalBehavior;
pub use protocol::ledger::Detection;
pub use protocol::message::{Message, NodeId, Round, Value};
pub use protocol::peers::{Peer, PeerRegistry};
pub use protocol::processor::{NodeConfig, NodeContext, NodeStatus};
