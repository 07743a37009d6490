//! Cluster membership and lifecycle
//!
//! A [`Cluster`] owns named [`NodeGroup`]s, each of which owns its
//! [`Node`]s. Groups and clusters are shared handles: concurrent phases
//! clone them into tasks and mutate membership through interior locks,
//! never holding a lock across a remote call.

mod group;
mod node;
mod setup;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::{ClientFactory, ConnectionOptions};
use crate::config::{BeeConfig, ConfigError, NodeGroupProfile};
use crate::deadline::Interrupted;
use crate::platform::Platform;
use crate::tasks::TaskGroup;

pub use group::{NodeGroup, NodeGroupError, NodeGroupOptions, HEALTH_POLL_INTERVAL};
pub use node::{Node, NodeOptions, NodeState};
pub use setup::{delete_cluster, setup_cluster, StartMode};

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("node group {0} not found")]
    NodeGroupNotFound(String),
    #[error("node group {0} already exists")]
    DuplicateNodeGroup(String),
    #[error("node group {group}: {source}")]
    Group {
        group: String,
        #[source]
        source: NodeGroupError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl ClusterError {
    pub(crate) fn group(group: &str) -> impl Fn(NodeGroupError) -> ClusterError + '_ {
        move |source| ClusterError::Group {
            group: group.to_string(),
            source,
        }
    }
}

/// Connection and provisioning settings shared by every group
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub namespace: String,
    pub disable_namespace: bool,
    pub api: ConnectionOptions,
    pub debug_api: ConnectionOptions,
    pub platform: Option<Arc<dyn Platform>>,
    pub clients: Arc<dyn ClientFactory>,
}

/// Named collection of node groups
#[derive(Debug, Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

#[derive(Debug)]
struct ClusterInner {
    name: String,
    options: ClusterOptions,
    groups: RwLock<BTreeMap<String, NodeGroup>>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, options: ClusterOptions) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                name: name.into(),
                options,
                groups: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn namespace(&self) -> &str {
        &self.inner.options.namespace
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.inner.options
    }

    /// Register a new, empty node group
    pub fn add_node_group(
        &self,
        name: impl Into<String>,
        profile: NodeGroupProfile,
        bee_config: BeeConfig,
    ) -> Result<NodeGroup, ClusterError> {
        let name = name.into();
        let mut groups = self.inner.groups.write();
        if groups.contains_key(&name) {
            return Err(ClusterError::DuplicateNodeGroup(name));
        }
        let group = NodeGroup::new(name.clone(), self.group_options(profile, bee_config));
        groups.insert(name.clone(), group.clone());
        tracing::debug!(cluster = %self.name(), group = %name, "node group added");
        Ok(group)
    }

    /// Return the named group, registering it with `make` if absent
    pub fn node_group_or_insert_with(
        &self,
        name: &str,
        make: impl FnOnce() -> Result<(NodeGroupProfile, BeeConfig), ClusterError>,
    ) -> Result<NodeGroup, ClusterError> {
        if let Ok(group) = self.node_group(name) {
            return Ok(group);
        }
        let (profile, bee_config) = make()?;
        let mut groups = self.inner.groups.write();
        let group = groups
            .entry(name.to_string())
            .or_insert_with(|| NodeGroup::new(name, self.group_options(profile, bee_config)));
        Ok(group.clone())
    }

    pub fn node_group(&self, name: &str) -> Result<NodeGroup, ClusterError> {
        self.inner
            .groups
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NodeGroupNotFound(name.to_string()))
    }

    /// Every group, in name order
    pub fn node_groups(&self) -> Vec<NodeGroup> {
        self.inner.groups.read().values().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.groups.read().values().map(NodeGroup::len).sum()
    }

    /// Delete every node of every group, then forget the groups
    pub async fn delete(&self) -> Result<(), ClusterError> {
        for group in self.node_groups() {
            let mut tasks = TaskGroup::new();
            for name in group.nodes_sorted() {
                let group = group.clone();
                tasks.spawn(async move { group.delete_node(&name).await });
            }
            tasks
                .wait(|e| NodeGroupError::Task(e.to_string()))
                .await
                .map_err(ClusterError::group(group.name()))?;
            tracing::info!(cluster = %self.name(), group = %group.name(), "node group deleted");
        }
        self.inner.groups.write().clear();
        Ok(())
    }

    fn group_options(&self, profile: NodeGroupProfile, bee_config: BeeConfig) -> NodeGroupOptions {
        let options = &self.inner.options;
        NodeGroupOptions {
            namespace: options.namespace.clone(),
            disable_namespace: options.disable_namespace,
            api: options.api.clone(),
            debug_api: options.debug_api.clone(),
            profile,
            bee_config,
            platform: options.platform.clone(),
            clients: options.clients.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemoryNetwork;

    #[tokio::test]
    async fn test_group_registry() {
        let net = MemoryNetwork::new();
        let cluster = Cluster::new("bee", net.cluster_options("test"));

        cluster
            .add_node_group("drone", NodeGroupProfile::default(), BeeConfig::default())
            .unwrap();
        assert!(matches!(
            cluster.add_node_group("drone", NodeGroupProfile::default(), BeeConfig::default()),
            Err(ClusterError::DuplicateNodeGroup(_))
        ));
        assert!(matches!(
            cluster.node_group("light"),
            Err(ClusterError::NodeGroupNotFound(_))
        ));

        let light = cluster
            .node_group_or_insert_with("light", || {
                Ok((NodeGroupProfile::default(), BeeConfig::default()))
            })
            .unwrap();
        assert_eq!(light.name(), "light");
        let names: Vec<_> = cluster
            .node_groups()
            .iter()
            .map(|g| g.name().to_string())
            .collect();
        assert_eq!(names, vec!["drone", "light"]);
    }

    #[tokio::test]
    async fn test_delete_tears_down_every_node() {
        let net = MemoryNetwork::new();
        let cluster = Cluster::new("bee", net.cluster_options("test"));
        let drone = cluster
            .add_node_group("drone", NodeGroupProfile::default(), BeeConfig::default())
            .unwrap();
        for name in drone.unused_names(3) {
            drone.add_start_node(name, NodeOptions::default()).await.unwrap();
        }
        assert_eq!(cluster.node_count(), 3);

        cluster.delete().await.unwrap();
        assert!(cluster.node_groups().is_empty());
        for name in ["drone-0", "drone-1", "drone-2"] {
            assert!(!net.exists(name));
        }
    }
}
