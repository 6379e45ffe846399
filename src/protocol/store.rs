use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::message::{NodeId, Round, Value};

/// One (round, sender) pair, the granularity at which values are collected
/// and conflicts judged.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RoundKey {
    pub round: Round,
    pub sender: NodeId,
}

impl RoundKey {
    pub fn new(round: Round, sender: NodeId) -> Self {
        RoundKey { round, sender }
    }
}

/// A value observed for some (round, sender), tagged with the node that
/// first delivered it here (which is the original sender only for direct
/// sends) and the local receipt time.
#[derive(Clone, Debug, Serialize)]
pub struct ObservedValue {
    pub value: Value,
    pub delivered_by: NodeId,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RoundEntry {
    values: Vec<ObservedValue>,
    last_seen: DateTime<Utc>,
}

impl RoundEntry {
    fn new() -> Self {
        RoundEntry {
            values: Vec::new(),
            last_seen: Utc::now(),
        }
    }
}

pub enum RecordOutcome {
    /// This exact (sender, round, value) instance was already recorded.
    Duplicate,
    /// New information; carries the distinct-value set as of this insert,
    /// snapshotted under the entry lock so the conflict decision for this
    /// receipt cannot race a concurrent insert for the same key.
    Recorded { distinct_values: Vec<Value> },
}

#[derive(Clone, Debug, Serialize)]
pub struct RoundSummary {
    pub round: Round,
    pub sender: NodeId,
    pub distinct_values: usize,
    pub last_seen: DateTime<Utc>,
}

/// Per-round, per-sender record of observed values. Append-only while the
/// round is live; whole entries are evicted only by retention pruning.
///
/// The map's per-entry locking serializes mutations to one (round, sender)
/// pair without any lock shared across pairs.
#[derive(Debug, Default)]
pub struct RoundStore {
    entries: DashMap<RoundKey, RoundEntry>,
}

impl RoundStore {
    pub fn new() -> Self {
        RoundStore {
            entries: DashMap::new(),
        }
    }

    pub fn record(&self, key: RoundKey, value: &Value, delivered_by: &NodeId) -> RecordOutcome {
        let mut entry = self.entries.entry(key).or_insert_with(RoundEntry::new);
        entry.last_seen = Utc::now();

        if entry.values.iter().any(|observed| &observed.value == value) {
            return RecordOutcome::Duplicate;
        }

        entry.values.push(ObservedValue {
            value: value.clone(),
            delivered_by: delivered_by.clone(),
            received_at: Utc::now(),
        });

        RecordOutcome::Recorded {
            distinct_values: entry
                .values
                .iter()
                .map(|observed| observed.value.clone())
                .collect(),
        }
    }

    pub fn distinct_values(&self, key: &RoundKey) -> Vec<Value> {
        self.entries
            .get(key)
            .map(|entry| {
                entry
                    .values
                    .iter()
                    .map(|observed| observed.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot for status queries, ordered by round then sender.
    pub fn summaries(&self) -> Vec<RoundSummary> {
        let mut summaries: Vec<RoundSummary> = self
            .entries
            .iter()
            .map(|entry| RoundSummary {
                round: entry.key().round,
                sender: entry.key().sender.clone(),
                distinct_values: entry.values.len(),
                last_seen: entry.last_seen,
            })
            .collect();
        summaries.sort_by(|a, b| (a.round, &a.sender).cmp(&(b.round, &b.sender)));
        summaries
    }

    /// Evicts entries with no observed message since `cutoff`. Returns the
    /// number of evicted entries.
    pub fn prune_idle_since(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.last_seen >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> RoundKey {
        RoundKey::new(7, NodeId::from("node4"))
    }

    #[test]
    fn test_first_record_is_new() {
        let store = RoundStore::new();
        match store.record(key(), &"A".to_string(), &NodeId::from("node4")) {
            RecordOutcome::Recorded { distinct_values } => {
                assert_eq!(distinct_values, vec!["A".to_string()]);
            }
            RecordOutcome::Duplicate => panic!("first insert reported as duplicate"),
        }
    }

    #[test]
    fn test_duplicate_instance_absorbed() {
        let store = RoundStore::new();
        store.record(key(), &"A".to_string(), &NodeId::from("node4"));
        // Same value via a different deliverer is still the same instance.
        let outcome = store.record(key(), &"A".to_string(), &NodeId::from("node2"));
        assert!(matches!(outcome, RecordOutcome::Duplicate));
        assert_eq!(store.distinct_values(&key()), vec!["A".to_string()]);
    }

    #[test]
    fn test_conflicting_value_grows_the_set() {
        let store = RoundStore::new();
        store.record(key(), &"A".to_string(), &NodeId::from("node4"));
        match store.record(key(), &"B".to_string(), &NodeId::from("node2")) {
            RecordOutcome::Recorded { distinct_values } => {
                assert_eq!(distinct_values, vec!["A".to_string(), "B".to_string()]);
            }
            RecordOutcome::Duplicate => panic!("distinct value reported as duplicate"),
        }
    }

    #[test]
    fn test_rounds_are_isolated() {
        let store = RoundStore::new();
        store.record(
            RoundKey::new(1, NodeId::from("node4")),
            &"A".to_string(),
            &NodeId::from("node4"),
        );
        store.record(
            RoundKey::new(2, NodeId::from("node4")),
            &"B".to_string(),
            &NodeId::from("node4"),
        );
        assert_eq!(
            store.distinct_values(&RoundKey::new(1, NodeId::from("node4"))),
            vec!["A".to_string()]
        );
        assert_eq!(
            store.distinct_values(&RoundKey::new(2, NodeId::from("node4"))),
            vec!["B".to_string()]
        );
    }

    #[test]
    fn test_prune_evicts_only_idle_entries() {
        let store = RoundStore::new();
        store.record(key(), &"A".to_string(), &NodeId::from("node4"));

        assert_eq!(store.prune_idle_since(Utc::now() - Duration::minutes(5)), 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.prune_idle_since(Utc::now() + Duration::minutes(5)), 1);
        assert!(store.is_empty());
    }
}
