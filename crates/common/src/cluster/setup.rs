//! Building a cluster from its declarative configuration
//!
//! Bootnode groups come up first. Their advertised addresses are gathered
//! into one space separated list, which is then baked into the runtime
//! configuration of every other group before any of its nodes start.

use super::{Cluster, ClusterError, ClusterOptions, NodeGroupError, NodeOptions};
use crate::config::{Config, GroupMode};
use crate::tasks::TaskGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Provision and start every node
    Start,
    /// Register nodes of an already running deployment as live
    Attach,
}

/// Build the configured cluster, starting or attaching to its nodes
pub async fn setup_cluster(
    config: &Config,
    options: ClusterOptions,
    mode: StartMode,
) -> Result<Cluster, ClusterError> {
    let cluster = Cluster::new(config.cluster.name.clone(), options);
    let bootnodes = start_bootnodes(config, &cluster, mode).await?;
    start_peers(config, &cluster, mode, &bootnodes).await?;
    tracing::info!(
        cluster = %cluster.name(),
        nodes = cluster.node_count(),
        ?mode,
        "cluster ready"
    );
    Ok(cluster)
}

/// Phase one; returns the aggregated bootnode address list
async fn start_bootnodes(
    config: &Config,
    cluster: &Cluster,
    mode: StartMode,
) -> Result<String, ClusterError> {
    let namespace = config.cluster.namespace.as_str();
    let mut addresses = Vec::new();

    for (name, definition) in &config.cluster.node_groups {
        if definition.mode != GroupMode::Bootnode {
            continue;
        }
        let profile = config.node_group_profile(name, &definition.config)?;
        let bee_config = config.bee_profile(name, &definition.bee_config)?;
        let group = cluster.add_node_group(name.clone(), profile, bee_config.clone())?;

        let mut tasks = TaskGroup::new();
        for node in &definition.nodes {
            let address = node.bootnode_address(namespace);
            let mut node_config = bee_config.clone();
            node_config.bootnodes = address.clone();
            addresses.push(address);

            let options = NodeOptions {
                bootnode: true,
                config: Some(node_config),
                secrets: node.secrets(),
            };
            match mode {
                StartMode::Start => {
                    let group = group.clone();
                    let node_name = node.name.clone();
                    tasks.spawn(async move { group.add_start_node(node_name, options).await });
                }
                StartMode::Attach => group
                    .attach_node(node.name.clone(), options)
                    .map_err(ClusterError::group(name))?,
            }
        }
        tasks
            .wait(|e| NodeGroupError::Task(e.to_string()))
            .await
            .map_err(ClusterError::group(name))?;
        tracing::info!(group = %name, nodes = group.len(), "bootnode group ready");
    }

    Ok(addresses.join(" "))
}

/// Phase two; every peer group is configured with `bootnodes`
async fn start_peers(
    config: &Config,
    cluster: &Cluster,
    mode: StartMode,
    bootnodes: &str,
) -> Result<(), ClusterError> {
    for (name, definition) in &config.cluster.node_groups {
        if definition.mode == GroupMode::Bootnode {
            continue;
        }
        let profile = config.node_group_profile(name, &definition.config)?;
        let mut bee_config = config.bee_profile(name, &definition.bee_config)?;
        bee_config.bootnodes = bootnodes.to_string();
        let group = cluster.add_node_group(name.clone(), profile, bee_config)?;

        let mut tasks = TaskGroup::new();
        for node_name in definition.node_names(name) {
            match mode {
                StartMode::Start => {
                    let group = group.clone();
                    tasks.spawn(async move {
                        group.add_start_node(node_name, NodeOptions::default()).await
                    });
                }
                StartMode::Attach => group
                    .attach_node(node_name, NodeOptions::default())
                    .map_err(ClusterError::group(name))?,
            }
        }
        tasks
            .wait(|e| NodeGroupError::Task(e.to_string()))
            .await
            .map_err(ClusterError::group(name))?;
        tracing::info!(group = %name, nodes = group.len(), "node group ready");
    }
    Ok(())
}

/// Release every node the configuration declares
///
/// Nodes are registered first so deletion goes through the same path as a
/// live cluster, which makes this usable from a fresh process.
pub async fn delete_cluster(config: &Config, options: ClusterOptions) -> Result<(), ClusterError> {
    let cluster = Cluster::new(config.cluster.name.clone(), options);
    for (name, definition) in &config.cluster.node_groups {
        let profile = config.node_group_profile(name, &definition.config)?;
        let bee_config = config.bee_profile(name, &definition.bee_config)?;
        let group = cluster.add_node_group(name.clone(), profile, bee_config)?;
        for node_name in definition.node_names(name) {
            group
                .add_node(node_name, NodeOptions::default())
                .map_err(ClusterError::group(name))?;
        }
        tracing::info!(group = %name, nodes = group.len(), "deleting node group");
    }
    cluster.delete().await
}
