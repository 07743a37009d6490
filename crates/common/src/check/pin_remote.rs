use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use super::{sorted_nodes, Check, CheckError, RunContext, METRICS_NAMESPACE};
use crate::api::{NodeApi, UploadOptions};
use crate::cluster::Cluster;
use crate::content::{Chunk, SwarmAddress};
use crate::metrics::{metric_name, Collector, CounterVec, GaugeVec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRemoteOptions {
    pub node_group: String,
    /// Local store capacity of a node, in chunks
    pub store_size: u64,
    /// Filler uploaded per round is `store_size / capacity_divisor`
    pub capacity_divisor: u64,
}

impl Default for PinRemoteOptions {
    fn default() -> Self {
        Self {
            node_group: "bee".to_string(),
            store_size: 1000,
            capacity_divisor: 3,
        }
    }
}

impl PinRemoteOptions {
    /// Filler chunks uploaded per round
    pub fn chunks_per_round(&self) -> u64 {
        (self.store_size / self.capacity_divisor).max(1)
    }

    /// Enough rounds to push more than the whole store through
    pub fn rounds(&self) -> u64 {
        self.capacity_divisor + 1
    }
}

#[derive(Debug)]
struct PinRemoteMetrics {
    filler: Arc<CounterVec>,
    rounds: Arc<CounterVec>,
    pinned: Arc<GaugeVec>,
}

impl PinRemoteMetrics {
    fn new() -> Self {
        let name = |n| metric_name(METRICS_NAMESPACE, "check_pin_remote", n);
        Self {
            filler: Arc::new(CounterVec::new(
                name("filler_chunks_uploaded_total"),
                "Number of filler chunks uploaded to push the pinned chunk out of the store.",
                &["node"],
            )),
            rounds: Arc::new(CounterVec::new(
                name("rounds_total"),
                "Number of completed rounds with the pinned chunk still present.",
                &["node"],
            )),
            pinned: Arc::new(GaugeVec::new(
                name("pinned_chunk_present"),
                "Whether the remotely pinned chunk was found after the last round.",
                &["node"],
            )),
        }
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![
            self.filler.clone() as Arc<dyn Collector>,
            self.rounds.clone() as Arc<dyn Collector>,
            self.pinned.clone() as Arc<dyn Collector>,
        ]
    }
}

/// Pin a chunk uploaded elsewhere, then flood the network and make sure
/// the pin keeps the chunk in the pinning node's local store
#[derive(Debug, Clone, Copy, Default)]
pub struct PinRemote;

#[async_trait]
impl Check for PinRemote {
    type Options = PinRemoteOptions;

    fn name(&self) -> &'static str {
        "pin-remote"
    }

    async fn run(
        &self,
        cluster: &Cluster,
        options: &PinRemoteOptions,
        ctx: &RunContext,
    ) -> Result<(), CheckError> {
        if options.capacity_divisor == 0 || options.store_size == 0 {
            return Err(CheckError::BadParameters(
                "db capacity and capacity divisor must be positive".to_string(),
            ));
        }
        let group = cluster.node_group(&options.node_group)?;
        let nodes = sorted_nodes(&group, 2)?;
        let metrics = PinRemoteMetrics::new();
        ctx.register(metrics.collectors());

        let mut rng = ctx.generator();
        let pivot_index = rng.random_range(0..nodes.len());
        let pivot = nodes[pivot_index].as_str();
        let pinner = nodes[(pivot_index + 1) % nodes.len()].as_str();
        let pivot_client = group.node_client(pivot)?;
        let pinner_client = group.node_client(pinner)?;

        let reference = Chunk::random(&mut rng);
        let address = pivot_client
            .upload_chunk(reference.data(), UploadOptions::default())
            .await
            .map_err(CheckError::api(pivot))?;
        tracing::info!(pivot = %pivot, address = %address, "reference chunk uploaded");

        pinner_client
            .pin_chunk(&address)
            .await
            .map_err(CheckError::api(pinner))?;
        tracing::info!(pinner = %pinner, address = %address, "reference chunk pinned remotely");
        verify_pinned(pinner_client.as_ref(), pinner, &address, 0, &metrics).await?;

        let per_round = options.chunks_per_round();
        for round in 1..=options.rounds() {
            for _ in 0..per_round {
                let filler = Chunk::random(&mut rng);
                pivot_client
                    .upload_chunk(filler.data(), UploadOptions::default())
                    .await
                    .map_err(CheckError::api(pivot))?;
                metrics.filler.inc(&[pivot]);
            }

            let result = verify_pinned(pinner_client.as_ref(), pinner, &address, round, &metrics).await;
            ctx.push().await;
            result?;

            metrics.rounds.inc(&[pinner]);
            tracing::info!(
                pinner = %pinner,
                address = %address,
                "Round {}/{}: {} filler chunks uploaded, pinned chunk still present",
                round,
                options.rounds(),
                per_round
            );
        }

        Ok(())
    }
}

async fn verify_pinned(
    client: &dyn NodeApi,
    node: &str,
    address: &SwarmAddress,
    round: u64,
    metrics: &PinRemoteMetrics,
) -> Result<(), CheckError> {
    let status = client
        .pin_status(address)
        .await
        .map_err(CheckError::api(node))?;
    let present = client
        .has_chunk(address)
        .await
        .map_err(CheckError::api(node))?;
    metrics
        .pinned
        .set(&[node], if status.pinned && present { 1.0 } else { 0.0 });

    let reason = match (status.pinned, present) {
        (true, true) => return Ok(()),
        (false, _) => "pinned",
        (true, false) => "present",
    };
    tracing::error!(node = %node, address = %address, round, "pinned chunk lost");
    Err(CheckError::PinLost {
        node: node.to_string(),
        address: *address,
        round,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_arithmetic() {
        let options = PinRemoteOptions {
            store_size: 1000,
            capacity_divisor: 3,
            ..Default::default()
        };
        assert_eq!(options.chunks_per_round(), 333);
        assert_eq!(options.rounds(), 4);
        // total filler exceeds the store
        assert!(options.chunks_per_round() * options.rounds() > options.store_size);

        let tiny = PinRemoteOptions {
            store_size: 2,
            capacity_divisor: 5,
            ..Default::default()
        };
        assert_eq!(tiny.chunks_per_round(), 1);
    }
}
