//! Shared fixtures for cluster and check integration tests
#![allow(dead_code)]

use std::sync::Arc;

use ::common::check::CheckRunner;
use ::common::cluster::{Cluster, NodeGroup, NodeOptions};
use ::common::config::{BeeConfig, NodeGroupProfile};
use ::common::metrics::MetricsSink;
use ::common::testkit::{MemoryNetwork, MemorySink};

/// Two bootnodes in `bee`, three peers in `drone`
pub const CLUSTER: &str = r#"
[cluster]
name = "bee"
namespace = "test"

[cluster.node-groups.bee]
mode = "bootnode"
nodes = [
  { name = "bee-0", bootnodes = "/dns4/bee-1-headless.{namespace}.svc.cluster.local/tcp/1634" },
  { name = "bee-1", bootnodes = "/dns4/bee-0-headless.{namespace}.svc.cluster.local/tcp/1634" },
]

[cluster.node-groups.drone]
count = 3
"#;

/// Start [`CLUSTER`] on a fresh network
pub async fn start_cluster() -> (MemoryNetwork, Cluster) {
    start_cluster_on(MemoryNetwork::new()).await
}

pub async fn start_cluster_on(net: MemoryNetwork) -> (MemoryNetwork, Cluster) {
    let cluster = net.start_cluster(CLUSTER).await.unwrap();
    (net, cluster)
}

/// A cluster with a single group of `count` running nodes
pub async fn running_group(net: &MemoryNetwork, group: &str, count: usize) -> (Cluster, NodeGroup) {
    let cluster = Cluster::new("test", net.cluster_options("test"));
    let g = cluster
        .add_node_group(group, NodeGroupProfile::default(), BeeConfig::default())
        .unwrap();
    for name in g.unused_names(count) {
        g.add_start_node(name, NodeOptions::default()).await.unwrap();
    }
    (cluster, g)
}

/// Runner with a fixed seed reporting into a fresh sink
pub fn runner(cluster: &Cluster, seed: i64) -> (CheckRunner, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let metrics: Arc<dyn MetricsSink> = sink.clone();
    let runner = CheckRunner::new(cluster.clone())
        .with_seed(Some(seed))
        .with_metrics(Some(metrics));
    (runner, sink)
}
