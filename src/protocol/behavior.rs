use serde::{Deserialize, Serialize};

use super::message::Value;
use super::peers::Peer;

/// Suffix appended to the second group's value by the splitting strategy.
pub const CONFLICT_SUFFIX: &str = "_BYZANTINE";

/// How a node behaves when it originates a proposal. Selected at node
/// construction; all the branching lives in `plan`, so the send path itself
/// is identical for honest and faulty nodes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ProposalBehavior {
    /// The same value goes to every peer.
    Honest,
    /// The fault under study: the registry-ordered peer list is split in
    /// half, the first half receives the value as given and the second half
    /// a conflicting variant. Deterministic, and guaranteed to emit two
    /// distinct values whenever there are at least two peers.
    ByzantineSplit,
}

impl ProposalBehavior {
    pub fn is_byzantine(&self) -> bool {
        matches!(self, ProposalBehavior::ByzantineSplit)
    }

    /// Assigns the value each peer will be sent for one proposal.
    pub fn plan<'a>(&self, value: &Value, peers: &'a [Peer]) -> Vec<(&'a Peer, Value)> {
        match self {
            ProposalBehavior::Honest => {
                peers.iter().map(|peer| (peer, value.clone())).collect()
            }
            ProposalBehavior::ByzantineSplit => {
                // With a single peer there is no one to equivocate to.
                if peers.len() < 2 {
                    return peers.iter().map(|peer| (peer, value.clone())).collect();
                }
                let split = peers.len() / 2;
                peers
                    .iter()
                    .enumerate()
                    .map(|(i, peer)| {
                        if i < split {
                            (peer, value.clone())
                        } else {
                            (peer, format!("{value}{CONFLICT_SUFFIX}"))
                        }
                    })
                    .collect()
            }
        }
    }
}
