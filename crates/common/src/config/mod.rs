//! Declarative cluster configuration
//!
//! A single TOML file describes the cluster, its node groups, the profiles
//! those groups are built from, the provisioner and optional scaling stages.

mod bee;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ConnectionOptions;
use crate::platform::{ExecPlatform, ExecPlatformConfig, NodeSecrets, Platform};
use crate::stage::Stage;

pub use bee::BeeConfig;

/// Placeholder substituted with the cluster namespace in bootnode templates
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("node group {group} references unknown {kind} profile {profile}")]
    ProfileNotFound {
        group: String,
        kind: &'static str,
        profile: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub node_group_profiles: BTreeMap<String, NodeGroupProfile>,
    #[serde(default)]
    pub bee_profiles: BTreeMap<String, BeeConfig>,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&raw)?;
        tracing::debug!(
            path = %path.display(),
            cluster = %config.cluster.name,
            groups = config.cluster.node_groups.len(),
            "loaded cluster config"
        );
        Ok(config)
    }

    /// Parse and check that every referenced profile exists
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (group, definition) in &self.cluster.node_groups {
            self.node_group_profile(group, &definition.config)?;
            self.bee_profile(group, &definition.bee_config)?;
        }
        Ok(())
    }

    /// Look up a group profile; an empty name means the default profile
    pub fn node_group_profile(
        &self,
        group: &str,
        profile: &str,
    ) -> Result<NodeGroupProfile, ConfigError> {
        if profile.is_empty() {
            return Ok(NodeGroupProfile::default());
        }
        self.node_group_profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound {
                group: group.to_string(),
                kind: "node group",
                profile: profile.to_string(),
            })
    }

    /// Look up a bee profile; an empty name means the default configuration
    pub fn bee_profile(&self, group: &str, profile: &str) -> Result<BeeConfig, ConfigError> {
        if profile.is_empty() {
            return Ok(BeeConfig::default());
        }
        self.bee_profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound {
                group: group.to_string(),
                kind: "bee",
                profile: profile.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClusterConfig {
    pub name: String,
    pub namespace: String,
    pub disable_namespace: bool,
    pub api: ConnectionOptions,
    pub debug_api: ConnectionOptions,
    pub node_groups: BTreeMap<String, NodeGroupConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "bee".to_string(),
            namespace: "bee".to_string(),
            disable_namespace: false,
            api: ConnectionOptions::default(),
            debug_api: ConnectionOptions::default(),
            node_groups: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupMode {
    Bootnode,
    #[default]
    Node,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NodeGroupConfig {
    pub mode: GroupMode,
    /// Name of the node group profile
    pub config: String,
    /// Name of the bee profile
    pub bee_config: String,
    /// Number of generated `<group>-<index>` nodes
    pub count: usize,
    /// Explicitly named nodes; bootnode groups are declared this way
    pub nodes: Vec<NodeConfig>,
}

impl NodeGroupConfig {
    /// Names of every node this group declares, in declaration order
    pub fn node_names(&self, group: &str) -> Vec<String> {
        match self.mode {
            GroupMode::Bootnode => self.nodes.iter().map(|n| n.name.clone()).collect(),
            GroupMode::Node => (0..self.count).map(|i| node_name(group, i)).collect(),
        }
    }
}

/// Generated node name for position `index` in `group`
pub fn node_name(group: &str, index: usize) -> String {
    format!("{}-{}", group, index)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NodeConfig {
    pub name: String,
    /// Advertised multiaddress template, may contain `{namespace}`
    pub bootnodes: String,
    pub swarm_key: Option<String>,
    pub libp2p_key: Option<String>,
    pub clef_key: Option<String>,
    pub clef_password: Option<String>,
}

impl NodeConfig {
    pub fn secrets(&self) -> NodeSecrets {
        NodeSecrets {
            swarm_key: self.swarm_key.clone(),
            libp2p_key: self.libp2p_key.clone(),
            clef_key: self.clef_key.clone(),
            clef_password: self.clef_password.clone(),
        }
    }

    /// Bootnode address with the namespace substituted in
    pub fn bootnode_address(&self, namespace: &str) -> String {
        self.bootnodes.replace(NAMESPACE_PLACEHOLDER, namespace)
    }
}

fn default_start_timeout_secs() -> u64 {
    300
}

/// Deployment settings shared by every node of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NodeGroupProfile {
    pub image: String,
    pub image_pull_policy: String,
    pub labels: BTreeMap<String, String>,
    pub persistence_enabled: bool,
    pub storage_request: String,
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
}

impl NodeGroupProfile {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for NodeGroupProfile {
    fn default() -> Self {
        Self {
            image: "ethersphere/bee:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            labels: BTreeMap::new(),
            persistence_enabled: false,
            storage_request: "34Gi".to_string(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum PlatformConfig {
    /// Attach-only; starting a node is an error
    #[default]
    None,
    Exec(ExecPlatformConfig),
}

impl PlatformConfig {
    /// The configured provisioner, if any
    pub fn build(&self) -> Option<Arc<dyn Platform>> {
        match self {
            PlatformConfig::None => None,
            PlatformConfig::Exec(config) => Some(Arc::new(ExecPlatform::new(config.clone()))),
        }
    }
}
