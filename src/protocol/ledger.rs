use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::detector::Conflict;
use super::message::{NodeId, Round, Value};

/// A locally-produced assertion that `byzantine_node` equivocated in
/// `round`, with the conflicting values as evidence. Node-scoped: no
/// cross-node reconciliation ever happens.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Detection {
    pub detected_at: DateTime<Utc>,
    pub byzantine_node: NodeId,
    pub round: Round,
    pub conflicting_values: BTreeSet<Value>,
    pub detected_by: NodeId,
}

/// Outcome of folding a conflict into the ledger.
#[derive(Clone, Debug)]
pub enum LedgerUpdate {
    /// First detection for this (sender, round).
    New(Detection),
    /// Already flagged, but the distinct-value set grew; the existing
    /// record now carries the superset.
    Extended(Detection),
    /// Already flagged with the same evidence. Nothing recorded.
    Unchanged,
}

/// Insertion-ordered collection of detections for one node.
///
/// One record per (sender, round): re-detections of known evidence are
/// absorbed, while a later value that grows the conflicting set updates the
/// record in place, keeping the original detection time. Honest nodes that
/// eventually see the same messages therefore end up with identical records.
#[derive(Debug, Default)]
pub struct DetectionLedger {
    records: Mutex<Vec<Detection>>,
}

impl DetectionLedger {
    pub fn new() -> Self {
        DetectionLedger {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn upsert(&self, conflict: Conflict, detected_by: &NodeId) -> LedgerUpdate {
        let mut records = self.records.lock().expect("detection ledger poisoned");

        if let Some(existing) = records
            .iter_mut()
            .find(|record| record.byzantine_node == conflict.sender && record.round == conflict.round)
        {
            if conflict.values.is_subset(&existing.conflicting_values) {
                return LedgerUpdate::Unchanged;
            }
            existing.conflicting_values.extend(conflict.values);
            return LedgerUpdate::Extended(existing.clone());
        }

        let detection = Detection {
            detected_at: Utc::now(),
            byzantine_node: conflict.sender,
            round: conflict.round,
            conflicting_values: conflict.values,
            detected_by: detected_by.clone(),
        };
        records.push(detection.clone());
        LedgerUpdate::New(detection)
    }

    /// All records, insertion order.
    pub fn all(&self) -> Vec<Detection> {
        self.records
            .lock()
            .expect("detection ledger poisoned")
            .clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().expect("detection ledger poisoned").len()
    }
}
