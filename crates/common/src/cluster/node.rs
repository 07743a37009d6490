use std::fmt;
use std::sync::Arc;

use crate::api::NodeApi;
use crate::config::BeeConfig;
use crate::content::SwarmAddress;
use crate::platform::{InstanceHandle, NodeSecrets};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Added to the group but never provisioned; has no reachable API
    Registered,
    /// Live, whether started by the group or attached to
    Running,
    /// Stopped by the group; the instance is retained for a restart
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Registered => "registered",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Per-node settings; anything left unset falls back to the group's
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub bootnode: bool,
    pub config: Option<BeeConfig>,
    pub secrets: NodeSecrets,
}

/// A single member of a node group
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    options: NodeOptions,
    overlay: Option<SwarmAddress>,
    state: NodeState,
    instance: Option<InstanceHandle>,
    client: Option<Arc<dyn NodeApi>>,
}

impl Node {
    pub(crate) fn new(name: String, options: NodeOptions) -> Self {
        Self {
            name,
            options,
            overlay: None,
            state: NodeState::Registered,
            instance: None,
            client: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bootnode(&self) -> bool {
        self.options.bootnode
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Overlay address, known once the node has been seen running
    pub fn overlay(&self) -> Option<SwarmAddress> {
        self.overlay
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == NodeState::Running
    }

    pub fn instance(&self) -> Option<&InstanceHandle> {
        self.instance.as_ref()
    }

    pub(crate) fn client(&self) -> Option<Arc<dyn NodeApi>> {
        self.client.clone()
    }

    pub(crate) fn set_client(&mut self, client: Arc<dyn NodeApi>) {
        self.client = Some(client);
    }

    pub(crate) fn set_overlay(&mut self, overlay: SwarmAddress) {
        self.overlay = Some(overlay);
    }

    pub(crate) fn set_instance(&mut self, instance: InstanceHandle) {
        self.instance = Some(instance);
    }

    pub(crate) fn mark_running(&mut self) {
        self.state = NodeState::Running;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.state = NodeState::Stopped;
    }
}
