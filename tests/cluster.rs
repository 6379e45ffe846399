//! Multi-node scenarios: a four-node cluster wired over the in-process
//! channel transport, with handcrafted deliveries standing in for a faulty
//! sender's direct send path.

use std::collections::BTreeSet;
use std::time::Duration;

use byzdetect::{
    Cluster, Envelope, Message, NodeConfig, NodeId, ProposalBehavior,
};

fn four_nodes() -> Cluster {
    Cluster::build(
        &[
            ("node1", ProposalBehavior::Honest),
            ("node2", ProposalBehavior::Honest),
            ("node3", ProposalBehavior::Honest),
            ("node4", ProposalBehavior::ByzantineSplit),
        ],
        NodeConfig::default(),
    )
    .unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

fn direct(sender: &str, round: u64, value: &str) -> Envelope {
    Envelope {
        from: NodeId::from(sender),
        message: Message::new(NodeId::from(sender), round, value.to_string()),
    }
}

/// A consistent sender never triggers a detection, on any node, no matter
/// how many copies gossip produces.
#[tokio::test]
async fn no_false_positive_for_consistent_sender() {
    let cluster = four_nodes();

    cluster.handle("node1").unwrap().propose("tx1".to_string());
    settle().await;

    for handle in cluster.handles() {
        assert_eq!(
            handle.detection_count(),
            0,
            "{} flagged a consistent sender",
            handle.id()
        );
    }
    cluster.shutdown();
}

/// The forced split: node4 sends "A" to node1 and "B" to node2 for round 7.
/// node2's forward carries "B" to node1, which then holds both values and
/// produces exactly one record.
#[tokio::test]
async fn split_send_detected_via_gossip() {
    let cluster = four_nodes();
    let node1 = cluster.handle("node1").unwrap();
    let node2 = cluster.handle("node2").unwrap();

    node1.receive(direct("node4", 7, "A")).unwrap();
    node2.receive(direct("node4", 7, "B")).unwrap();
    settle().await;

    let detections = node1.detections();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].byzantine_node, NodeId::from("node4"));
    assert_eq!(detections[0].round, 7);
    assert_eq!(
        detections[0].conflicting_values,
        BTreeSet::from(["A".to_string(), "B".to_string()])
    );
    assert_eq!(detections[0].detected_by, NodeId::from("node1"));

    cluster.shutdown();
}

/// Liveness: node1 only ever hears "X" directly, but node3's forward of
/// "X'" reaches it, so node1 still convicts node4.
#[tokio::test]
async fn detection_reaches_nodes_outside_the_direct_split() {
    let cluster = four_nodes();
    let node1 = cluster.handle("node1").unwrap();
    let node3 = cluster.handle("node3").unwrap();

    node1.receive(direct("node4", 9, "X")).unwrap();
    node3.receive(direct("node4", 9, "X_alt")).unwrap();
    settle().await;

    let detections = node1.detections();
    assert_eq!(detections.len(), 1);
    assert!(detections[0]
        .conflicting_values
        .is_superset(&BTreeSet::from(["X".to_string(), "X_alt".to_string()])));

    cluster.shutdown();
}

/// Delivering the same envelopes again changes nothing: same store shape,
/// same single ledger record.
#[tokio::test]
async fn repeated_delivery_is_idempotent() {
    let cluster = four_nodes();
    let node1 = cluster.handle("node1").unwrap();

    for _ in 0..2 {
        node1.receive(direct("node4", 7, "A")).unwrap();
        node1.receive(direct("node4", 7, "B")).unwrap();
        settle().await;
    }

    let status = node1.status();
    assert_eq!(status.current_rounds.len(), 1);
    assert_eq!(status.current_rounds[0].distinct_values, 2);

    let detections = node1.detections();
    assert_eq!(detections.len(), 1);
    assert_eq!(
        detections[0].conflicting_values,
        BTreeSet::from(["A".to_string(), "B".to_string()])
    );

    cluster.shutdown();
}

/// Different values in different rounds are not a conflict.
#[tokio::test]
async fn no_detection_across_rounds() {
    let cluster = four_nodes();
    let node1 = cluster.handle("node1").unwrap();

    node1.receive(direct("node2", 1, "A")).unwrap();
    node1.receive(direct("node2", 2, "B")).unwrap();
    settle().await;

    for handle in cluster.handles() {
        assert_eq!(handle.detection_count(), 0);
    }

    cluster.shutdown();
}

/// A third conflicting value extends the existing record in place instead
/// of appending a second one.
#[tokio::test]
async fn third_value_extends_the_record() {
    let cluster = four_nodes();
    let node1 = cluster.handle("node1").unwrap();

    node1.receive(direct("node4", 7, "A")).unwrap();
    node1.receive(direct("node4", 7, "B")).unwrap();
    node1.receive(direct("node4", 7, "C")).unwrap();
    settle().await;

    let detections = node1.detections();
    assert_eq!(detections.len(), 1);
    assert_eq!(
        detections[0].conflicting_values,
        BTreeSet::from(["A".to_string(), "B".to_string(), "C".to_string()])
    );

    cluster.shutdown();
}

/// Status reflects identity, behavior and observed rounds.
#[tokio::test]
async fn status_snapshot() {
    let cluster = four_nodes();
    let node4 = cluster.handle("node4").unwrap();

    let status = node4.status();
    assert_eq!(status.node_id, NodeId::from("node4"));
    assert!(status.is_byzantine);
    assert_eq!(status.last_initiated_round, 0);
    assert_eq!(status.peers.len(), 3);

    let round = node4.propose("tx1".to_string());
    assert_eq!(round, 1);
    assert_eq!(node4.status().last_initiated_round, 1);

    cluster.shutdown();
}
