use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::node::{Node, NodeOptions, NodeState};
use crate::api::{ApiError, ClientFactory, ConnectionOptions, NodeApi, NodeEndpoints};
use crate::config::{node_name, BeeConfig, NodeGroupProfile};
use crate::content::SwarmAddress;
use crate::platform::{InstanceHandle, NodeSpec, Platform, PlatformError};

/// Interval between health probes while a node starts
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum NodeGroupError {
    #[error("node {node} already exists in group {group}")]
    DuplicateNode { group: String, node: String },
    #[error("node {node} not found in group {group}")]
    NodeNotFound { group: String, node: String },
    #[error("node {0} is not running")]
    NotRunning(String),
    #[error("node {node} not ready after {timeout:?}")]
    StartTimeout { node: String, timeout: Duration },
    #[error("no platform configured to manage node {0}")]
    NoPlatform(String),
    #[error("platform error on node {node}: {source}")]
    Platform {
        node: String,
        #[source]
        source: PlatformError,
    },
    #[error("api error on node {node}: {source}")]
    Api {
        node: String,
        #[source]
        source: ApiError,
    },
    #[error("node operation failed: {0}")]
    Task(String),
}

/// Settings shared by every node in a group
#[derive(Debug, Clone)]
pub struct NodeGroupOptions {
    pub namespace: String,
    pub disable_namespace: bool,
    pub api: ConnectionOptions,
    pub debug_api: ConnectionOptions,
    pub profile: NodeGroupProfile,
    /// Runtime configuration for nodes that do not bring their own
    pub bee_config: BeeConfig,
    pub platform: Option<Arc<dyn Platform>>,
    pub clients: Arc<dyn ClientFactory>,
}

/// Named set of nodes sharing one profile
///
/// Cheap to clone; clones share the same membership.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    options: NodeGroupOptions,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl NodeGroup {
    pub fn new(name: impl Into<String>, options: NodeGroupOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                options,
                nodes: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &NodeGroupOptions {
        &self.inner.options
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }

    /// Node names in ascending order
    pub fn nodes_sorted(&self) -> Vec<String> {
        self.inner.nodes.read().keys().cloned().collect()
    }

    /// Names of nodes in `state`, in ascending order
    pub fn nodes_in_state(&self, state: NodeState) -> Vec<String> {
        self.inner
            .nodes
            .read()
            .values()
            .filter(|n| n.state() == state)
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Snapshot of a single node
    pub fn node(&self, name: &str) -> Result<Node, NodeGroupError> {
        self.inner
            .nodes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    /// Snapshot of every node, in name order
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.nodes.read().values().cloned().collect()
    }

    /// The first `count` generated `<group>-<index>` names not in use
    pub fn unused_names(&self, count: usize) -> Vec<String> {
        let nodes = self.inner.nodes.read();
        (0..)
            .map(|i| node_name(self.name(), i))
            .filter(|name| !nodes.contains_key(name))
            .take(count)
            .collect()
    }

    /// Register a node without provisioning it
    pub fn add_node(
        &self,
        name: impl Into<String>,
        options: NodeOptions,
    ) -> Result<(), NodeGroupError> {
        let name = name.into();
        let mut nodes = self.inner.nodes.write();
        if nodes.contains_key(&name) {
            return Err(NodeGroupError::DuplicateNode {
                group: self.name().to_string(),
                node: name,
            });
        }
        tracing::debug!(group = %self.name(), node = %name, "node registered");
        nodes.insert(name.clone(), Node::new(name, options));
        Ok(())
    }

    /// Register a node of an already running deployment as live
    ///
    /// Nothing is provisioned; the overlay is fetched on first use.
    pub fn attach_node(
        &self,
        name: impl Into<String>,
        options: NodeOptions,
    ) -> Result<(), NodeGroupError> {
        let name = name.into();
        self.add_node(name.clone(), options)?;
        self.with_node(&name, Node::mark_running)
    }

    /// Register, provision and start a node, waiting until it is ready
    ///
    /// A node that fails to start is unregistered again and any instance
    /// already created for it is released.
    pub async fn add_start_node(
        &self,
        name: impl Into<String>,
        options: NodeOptions,
    ) -> Result<(), NodeGroupError> {
        let name = name.into();
        self.add_node(name.clone(), options)?;
        if let Err(e) = self.start_node(&name).await {
            self.rollback(&name).await;
            return Err(e);
        }
        Ok(())
    }

    /// Start a registered node; restarting a stopped node reuses its spec
    pub async fn start_node(&self, name: &str) -> Result<(), NodeGroupError> {
        let options = {
            let nodes = self.inner.nodes.read();
            let node = nodes.get(name).ok_or_else(|| self.not_found(name))?;
            if node.is_running() {
                return Ok(());
            }
            node.options().clone()
        };
        let platform = self.platform(name)?;

        tracing::info!(group = %self.name(), node = %name, "starting node");
        let spec = self.node_spec(name, &options);
        let instance = platform
            .create(&spec)
            .await
            .map_err(|source| NodeGroupError::Platform {
                node: name.to_string(),
                source,
            })?;
        self.with_node(name, |node| node.set_instance(instance))?;

        let client = self.client_for(name)?;
        self.wait_ready(name, client.as_ref()).await?;
        let overlay = client.overlay().await.map_err(|source| NodeGroupError::Api {
            node: name.to_string(),
            source,
        })?;

        self.with_node(name, |node| {
            node.set_overlay(overlay);
            node.mark_running();
        })?;
        tracing::info!(group = %self.name(), node = %name, overlay = %overlay, "node started");
        Ok(())
    }

    /// Stop a running node, keeping its registration; stopped nodes are left as is
    pub async fn stop_node(&self, name: &str) -> Result<(), NodeGroupError> {
        let instance = {
            let nodes = self.inner.nodes.read();
            let node = nodes.get(name).ok_or_else(|| self.not_found(name))?;
            if !node.is_running() {
                tracing::debug!(group = %self.name(), node = %name, state = %node.state(), "stop skipped");
                return Ok(());
            }
            node.instance().cloned()
        };
        let platform = self.platform(name)?;
        let instance = instance.unwrap_or_else(|| self.instance_handle(name));

        tracing::info!(group = %self.name(), node = %name, "stopping node");
        platform
            .stop(&instance)
            .await
            .map_err(|source| NodeGroupError::Platform {
                node: name.to_string(),
                source,
            })?;
        self.with_node(name, Node::mark_stopped)
    }

    /// Stop if running, release the instance and unregister the node
    pub async fn delete_node(&self, name: &str) -> Result<(), NodeGroupError> {
        let (running, instance) = {
            let nodes = self.inner.nodes.read();
            let node = nodes.get(name).ok_or_else(|| self.not_found(name))?;
            (node.is_running(), node.instance().cloned())
        };
        if running {
            self.stop_node(name).await?;
        }

        match &self.inner.options.platform {
            Some(platform) => {
                let instance = instance.unwrap_or_else(|| self.instance_handle(name));
                tracing::info!(group = %self.name(), node = %name, "deleting node");
                match platform.delete(&instance).await {
                    Ok(()) => {}
                    Err(PlatformError::NotFound(_)) => {
                        tracing::debug!(node = %name, "instance already gone");
                    }
                    Err(source) => {
                        return Err(NodeGroupError::Platform {
                            node: name.to_string(),
                            source,
                        })
                    }
                }
            }
            None => tracing::debug!(node = %name, "no platform, unregistering only"),
        }

        self.inner.nodes.write().remove(name);
        Ok(())
    }

    /// Overlay addresses of every running node
    ///
    /// Addresses are cached on the node after the first successful query.
    pub async fn overlays(&self) -> Result<BTreeMap<String, SwarmAddress>, NodeGroupError> {
        let snapshot: Vec<(String, Option<SwarmAddress>)> = self
            .inner
            .nodes
            .read()
            .values()
            .filter(|n| n.is_running())
            .map(|n| (n.name().to_string(), n.overlay()))
            .collect();

        let mut overlays = BTreeMap::new();
        for (name, cached) in snapshot {
            let overlay = match cached {
                Some(overlay) => overlay,
                None => {
                    let client = self.client_for(&name)?;
                    let overlay = client.overlay().await.map_err(|source| {
                        NodeGroupError::Api {
                            node: name.clone(),
                            source,
                        }
                    })?;
                    if let Some(node) = self.inner.nodes.write().get_mut(&name) {
                        node.set_overlay(overlay);
                    }
                    overlay
                }
            };
            overlays.insert(name, overlay);
        }
        Ok(overlays)
    }

    /// API handle of a running node
    pub fn node_client(&self, name: &str) -> Result<Arc<dyn NodeApi>, NodeGroupError> {
        if !self.node(name)?.is_running() {
            return Err(NodeGroupError::NotRunning(name.to_string()));
        }
        self.client_for(name)
    }

    fn client_for(&self, name: &str) -> Result<Arc<dyn NodeApi>, NodeGroupError> {
        if let Some(client) = self.node(name)?.client() {
            return Ok(client);
        }

        let options = &self.inner.options;
        let api_err = |source| NodeGroupError::Api {
            node: name.to_string(),
            source,
        };
        let endpoints = NodeEndpoints::resolve(
            name,
            &options.namespace,
            options.disable_namespace,
            &options.api,
            &options.debug_api,
        )
        .map_err(api_err)?;
        let client = options.clients.connect(&endpoints).map_err(api_err)?;

        self.with_node(name, |node| node.set_client(client.clone()))?;
        Ok(client)
    }

    async fn wait_ready(&self, name: &str, client: &dyn NodeApi) -> Result<(), NodeGroupError> {
        let timeout = self.inner.options.profile.start_timeout();
        let poll = async {
            loop {
                match client.health().await {
                    Ok(()) => return,
                    Err(e) => tracing::debug!(node = %name, "node not ready: {}", e),
                }
                tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| NodeGroupError::StartTimeout {
                node: name.to_string(),
                timeout,
            })
    }

    async fn rollback(&self, name: &str) {
        let removed = self.inner.nodes.write().remove(name);
        let instance = removed.and_then(|node| node.instance().cloned());
        if let (Some(instance), Some(platform)) = (instance, &self.inner.options.platform) {
            if let Err(e) = platform.delete(&instance).await {
                tracing::warn!(node = %name, "failed to release instance on rollback: {}", e);
            }
        }
        tracing::debug!(group = %self.name(), node = %name, "registration rolled back");
    }

    fn with_node<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Node) -> T,
    ) -> Result<T, NodeGroupError> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(name).ok_or_else(|| self.not_found(name))?;
        Ok(f(node))
    }

    fn platform(&self, name: &str) -> Result<&Arc<dyn Platform>, NodeGroupError> {
        self.inner
            .options
            .platform
            .as_ref()
            .ok_or_else(|| NodeGroupError::NoPlatform(name.to_string()))
    }

    fn node_spec(&self, name: &str, options: &NodeOptions) -> NodeSpec {
        let group = &self.inner.options;
        NodeSpec {
            name: name.to_string(),
            namespace: group.namespace.clone(),
            bootnode: options.bootnode,
            profile: group.profile.clone(),
            config: options
                .config
                .clone()
                .unwrap_or_else(|| group.bee_config.clone()),
            secrets: options.secrets.clone(),
        }
    }

    fn instance_handle(&self, name: &str) -> InstanceHandle {
        InstanceHandle {
            name: name.to_string(),
            namespace: self.inner.options.namespace.clone(),
        }
    }

    fn not_found(&self, name: &str) -> NodeGroupError {
        NodeGroupError::NodeNotFound {
            group: self.name().to_string(),
            node: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemoryNetwork;

    fn group(net: &MemoryNetwork) -> NodeGroup {
        NodeGroup::new("drone", net.group_options("test"))
    }

    #[tokio::test]
    async fn test_add_node_rejects_duplicates() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        g.add_node("drone-0", NodeOptions::default()).unwrap();
        let err = g.add_node("drone-0", NodeOptions::default()).unwrap_err();
        assert!(matches!(err, NodeGroupError::DuplicateNode { .. }));
        assert_eq!(g.len(), 1);
        assert_eq!(net.created("drone-0"), 0);
    }

    #[tokio::test]
    async fn test_nodes_sorted_is_lexicographic() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        for name in ["drone-2", "drone-10", "drone-0", "drone-1"] {
            g.add_node(name, NodeOptions::default()).unwrap();
        }
        let sorted = g.nodes_sorted();
        assert_eq!(sorted, vec!["drone-0", "drone-1", "drone-10", "drone-2"]);
        assert_eq!(g.nodes_sorted(), sorted);
    }

    #[tokio::test]
    async fn test_add_start_node_populates_overlay() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        assert!(g.node("drone-0").is_err());

        g.add_start_node("drone-0", NodeOptions::default())
            .await
            .unwrap();
        let node = g.node("drone-0").unwrap();
        assert!(node.is_running());
        assert_eq!(node.overlay(), Some(MemoryNetwork::overlay_of("drone-0")));
        assert!(net.is_up("drone-0"));
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_registration() {
        let net = MemoryNetwork::new();
        net.fail_create("drone-1");
        let g = group(&net);

        let err = g
            .add_start_node("drone-1", NodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeGroupError::Platform { ref node, .. } if node == "drone-1"));
        assert!(g.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_node_times_out() {
        let net = MemoryNetwork::new();
        net.never_ready("drone-0");
        let g = group(&net);

        let err = g
            .add_start_node("drone-0", NodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeGroupError::StartTimeout { .. }));
        assert!(g.is_empty());
        assert!(!net.is_up("drone-0"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_restart_works() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        g.add_start_node("drone-0", NodeOptions::default())
            .await
            .unwrap();

        g.stop_node("drone-0").await.unwrap();
        g.stop_node("drone-0").await.unwrap();
        assert_eq!(g.node("drone-0").unwrap().state(), NodeState::Stopped);
        assert!(!net.is_up("drone-0"));
        assert!(matches!(
            g.node_client("drone-0").unwrap_err(),
            NodeGroupError::NotRunning(_)
        ));

        g.start_node("drone-0").await.unwrap();
        assert!(g.node("drone-0").unwrap().is_running());
        assert_eq!(net.created("drone-0"), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_node() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        g.add_node("drone-0", NodeOptions::default()).unwrap();

        let err = g.delete_node("drone-7").await.unwrap_err();
        assert!(matches!(err, NodeGroupError::NodeNotFound { .. }));
        assert_eq!(g.nodes_sorted(), vec!["drone-0"]);
    }

    #[tokio::test]
    async fn test_delete_running_node_releases_instance() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        g.add_start_node("drone-0", NodeOptions::default())
            .await
            .unwrap();
        g.delete_node("drone-0").await.unwrap();
        assert!(g.is_empty());
        assert!(!net.exists("drone-0"));
    }

    #[tokio::test]
    async fn test_overlays_skip_stopped_nodes() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        for name in ["drone-0", "drone-1"] {
            g.add_start_node(name, NodeOptions::default()).await.unwrap();
        }
        g.stop_node("drone-1").await.unwrap();

        let overlays = g.overlays().await.unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays["drone-0"], MemoryNetwork::overlay_of("drone-0"));
    }

    #[tokio::test]
    async fn test_overlays_query_attached_nodes() {
        let net = MemoryNetwork::new();
        net.boot("drone-0");
        let g = group(&net);
        g.attach_node("drone-0", NodeOptions::default()).unwrap();
        assert!(g.node("drone-0").unwrap().is_running());
        assert_eq!(g.node("drone-0").unwrap().overlay(), None);

        let overlays = g.overlays().await.unwrap();
        assert_eq!(overlays["drone-0"], MemoryNetwork::overlay_of("drone-0"));
        assert!(g.node("drone-0").unwrap().overlay().is_some());
        assert_eq!(net.created("drone-0"), 0);
    }

    #[tokio::test]
    async fn test_overlays_skip_nodes_never_started() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        g.add_start_node("drone-0", NodeOptions::default())
            .await
            .unwrap();
        g.add_node("drone-1", NodeOptions::default()).unwrap();

        let overlays = g.overlays().await.unwrap();
        assert_eq!(overlays.keys().collect::<Vec<_>>(), vec!["drone-0"]);
        assert!(matches!(
            g.node_client("drone-1").unwrap_err(),
            NodeGroupError::NotRunning(_)
        ));
    }

    #[tokio::test]
    async fn test_overlays_fail_on_unreachable_node() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        g.attach_node("drone-0", NodeOptions::default()).unwrap();
        let err = g.overlays().await.unwrap_err();
        assert!(matches!(err, NodeGroupError::Api { .. }));
    }

    #[tokio::test]
    async fn test_attached_node_can_be_stopped() {
        let net = MemoryNetwork::new();
        net.boot("drone-0");
        let g = group(&net);
        g.attach_node("drone-0", NodeOptions::default()).unwrap();

        g.stop_node("drone-0").await.unwrap();
        assert_eq!(g.node("drone-0").unwrap().state(), NodeState::Stopped);
        assert!(!net.is_up("drone-0"));

        // starting an attached node again is a no-op
        g.attach_node("drone-1", NodeOptions::default()).unwrap();
        g.start_node("drone-1").await.unwrap();
        assert_eq!(net.created("drone-1"), 0);
    }

    #[tokio::test]
    async fn test_unused_names_fill_gaps() {
        let net = MemoryNetwork::new();
        let g = group(&net);
        for name in ["drone-0", "drone-2"] {
            g.add_node(name, NodeOptions::default()).unwrap();
        }
        assert_eq!(g.unused_names(3), vec!["drone-1", "drone-3", "drone-4"]);
    }

    #[tokio::test]
    async fn test_without_platform_start_fails() {
        let net = MemoryNetwork::new();
        let mut options = net.group_options("test");
        options.platform = None;
        let g = NodeGroup::new("drone", options);
        let err = g
            .add_start_node("drone-0", NodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeGroupError::NoPlatform(_)));
        assert!(g.is_empty());
    }
}
