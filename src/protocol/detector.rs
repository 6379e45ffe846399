use std::collections::BTreeSet;

use super::message::{NodeId, Round, Value};
use super::store::RoundKey;

/// Evidence that a sender equivocated in a round: at least two distinct
/// values observed under the same (round, sender).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Conflict {
    pub sender: NodeId,
    pub round: Round,
    pub values: BTreeSet<Value>,
}

/// The conflict rule. A distinct-value set of size one is consistent;
/// anything larger convicts the sender for this round.
///
/// The output depends only on the value *set*, never on arrival order, so
/// every node that eventually sees the same values reaches the same verdict.
pub fn evaluate(key: &RoundKey, distinct_values: &[Value]) -> Option<Conflict> {
    if distinct_values.len() < 2 {
        return None;
    }
    Some(Conflict {
        sender: key.sender.clone(),
        round: key.round,
        values: distinct_values.iter().cloned().collect(),
    })
}
