use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Check, CheckError, RunContext, METRICS_NAMESPACE};
use crate::cluster::Cluster;
use crate::content::SwarmAddress;
use crate::metrics::{metric_name, Collector, HistogramVec};
use crate::stage::{GroupTemplate, Stage, StageExecutor};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingOptions {
    /// Restrict pings to one group; every group when unset
    pub node_group: Option<String>,
    /// Re-run after applying each of `stages`
    pub dynamic: bool,
    pub stages: Vec<Stage>,
    /// Used when a stage creates a group
    pub templates: BTreeMap<String, GroupTemplate>,
}

#[derive(Debug)]
struct PingMetrics {
    rtt: Arc<HistogramVec>,
}

impl PingMetrics {
    fn new() -> Self {
        Self {
            rtt: Arc::new(HistogramVec::new(
                metric_name(METRICS_NAMESPACE, "check_pingpong", "rtt_seconds"),
                "Round trip time of a pingpong exchange.",
                &["node", "peer"],
            )),
        }
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![self.rtt.clone() as Arc<dyn Collector>]
    }
}

/// Ping every node from every other node
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

#[async_trait]
impl Check for Ping {
    type Options = PingOptions;

    fn name(&self) -> &'static str {
        "ping"
    }

    async fn run(
        &self,
        cluster: &Cluster,
        options: &PingOptions,
        ctx: &RunContext,
    ) -> Result<(), CheckError> {
        let metrics = PingMetrics::new();
        ctx.register(metrics.collectors());

        ping_all(cluster, options, ctx, &metrics).await?;
        if !options.dynamic {
            return Ok(());
        }

        let executor = StageExecutor::new(cluster.clone()).with_templates(options.templates.clone());
        for (index, stage) in options.stages.iter().enumerate() {
            executor.apply(index, stage).await?;
            tracing::info!(stage = index, "re-running ping after stage");
            ping_all(cluster, options, ctx, &metrics).await?;
        }
        Ok(())
    }
}

async fn ping_all(
    cluster: &Cluster,
    options: &PingOptions,
    ctx: &RunContext,
    metrics: &PingMetrics,
) -> Result<(), CheckError> {
    let groups = match &options.node_group {
        Some(name) => vec![cluster.node_group(name)?],
        None => cluster.node_groups(),
    };

    // node name -> (group, overlay), across every selected group
    let mut members = BTreeMap::new();
    for group in &groups {
        for (node, overlay) in group.overlays().await? {
            members.insert(node, (group.clone(), overlay));
        }
    }
    let peers: Vec<(&String, SwarmAddress)> = members
        .iter()
        .map(|(name, (_, overlay))| (name, *overlay))
        .collect();

    for (node, (group, _)) in &members {
        let client = group.node_client(node)?;
        for (peer, overlay) in &peers {
            if *peer == node {
                continue;
            }
            let rtt = client
                .ping(overlay)
                .await
                .map_err(CheckError::api(node))?;
            metrics.rtt.observe_duration(&[node.as_str(), peer.as_str()], rtt);
            tracing::info!(node = %node, peer = %peer, "Node {}. Ping to {} RTT: {:?}", node, overlay, rtt);
        }
        ctx.push().await;
    }
    Ok(())
}
