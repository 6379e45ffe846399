use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use byzdetect::{Cluster, NodeConfig, ProposalBehavior};

/// In-process demo: three honest nodes and one equivocating node. The
/// honest proposal raises no alarm; the Byzantine one is detected by every
/// honest node once gossip settles.
#[derive(Parser, Debug)]
#[command(name = "byzdetect")]
struct Args {
    /// Total node count; the last node equivocates.
    #[arg(long, default_value_t = 4)]
    nodes: usize,

    /// Payload for the proposals.
    #[arg(long, default_value = "tx1")]
    value: String,

    /// How long to let gossip settle after each proposal, in milliseconds.
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.nodes >= 2, "need at least two nodes");

    let names: Vec<String> = (1..=args.nodes).map(|i| format!("node{i}")).collect();
    let specs: Vec<(&str, ProposalBehavior)> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let behavior = if i == args.nodes - 1 {
                ProposalBehavior::ByzantineSplit
            } else {
                ProposalBehavior::Honest
            };
            (name.as_str(), behavior)
        })
        .collect();

    let cluster = Cluster::build(&specs, NodeConfig::default())?;
    let settle = Duration::from_millis(args.settle_ms);

    let honest = cluster.handles().remove(0);
    let round = honest.propose(args.value.clone());
    info!(node = %honest.id(), round, "honest proposal issued");
    tokio::time::sleep(settle).await;

    let byzantine = cluster.handles().pop().expect("cluster is non-empty");
    let round = byzantine.propose(args.value.clone());
    info!(node = %byzantine.id(), round, "byzantine proposal issued");
    tokio::time::sleep(settle).await;

    for handle in cluster.handles() {
        let report = serde_json::json!({
            "node_id": handle.id(),
            "detections": handle.detections(),
            "total_detections": handle.detection_count(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    cluster.shutdown();
    Ok(())
}
