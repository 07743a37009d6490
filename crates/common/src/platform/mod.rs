//! Node provisioning
//!
//! The cluster never talks to an orchestrator directly; it hands a
//! [`NodeSpec`] to a [`Platform`] and keeps the returned [`InstanceHandle`].

mod exec;

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

use async_trait::async_trait;

use crate::config::{BeeConfig, NodeGroupProfile};

pub use exec::{ExecPlatform, ExecPlatformConfig};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("instance {0} not found")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("platform error: {0}")]
    Other(String),
}

/// Secrets baked into a node's identity
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NodeSecrets {
    pub swarm_key: Option<String>,
    pub libp2p_key: Option<String>,
    pub clef_key: Option<String>,
    pub clef_password: Option<String>,
}

impl Debug for NodeSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("NodeSecrets")
            .field("swarm_key", &redact(&self.swarm_key))
            .field("libp2p_key", &redact(&self.libp2p_key))
            .field("clef_key", &redact(&self.clef_key))
            .field("clef_password", &redact(&self.clef_password))
            .finish()
    }
}

/// Everything a platform needs to bring one node up
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub namespace: String,
    pub bootnode: bool,
    pub profile: NodeGroupProfile,
    pub config: BeeConfig,
    pub secrets: NodeSecrets,
}

impl NodeSpec {
    /// Environment describing this node, as handed to provisioning commands
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = self.config.to_env();
        env.insert("NODE_NAME".into(), self.name.clone());
        env.insert("NAMESPACE".into(), self.namespace.clone());
        env.insert("NODE_BOOTNODE".into(), self.bootnode.to_string());
        env.insert("NODE_IMAGE".into(), self.profile.image.clone());
        env.insert(
            "NODE_IMAGE_PULL_POLICY".into(),
            self.profile.image_pull_policy.clone(),
        );
        env.insert(
            "NODE_PERSISTENCE".into(),
            self.profile.persistence_enabled.to_string(),
        );
        env.insert(
            "NODE_STORAGE_REQUEST".into(),
            self.profile.storage_request.clone(),
        );
        if !self.profile.labels.is_empty() {
            let labels = self
                .profile
                .labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            env.insert("NODE_LABELS".into(), labels);
        }

        let secrets = [
            ("NODE_SWARM_KEY", &self.secrets.swarm_key),
            ("NODE_LIBP2P_KEY", &self.secrets.libp2p_key),
            ("NODE_CLEF_KEY", &self.secrets.clef_key),
            ("NODE_CLEF_PASSWORD", &self.secrets.clef_password),
        ];
        for (key, value) in secrets {
            if let Some(value) = value {
                env.insert(key.into(), value.clone());
            }
        }
        env
    }
}

/// Opaque reference to a provisioned node instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle {
    pub name: String,
    pub namespace: String,
}

impl Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

#[async_trait]
pub trait Platform: Send + Sync + Debug {
    /// Provision and start an instance; creating an existing stopped
    /// instance starts it again
    async fn create(&self, spec: &NodeSpec) -> Result<InstanceHandle, PlatformError>;

    /// Stop a running instance while keeping its state
    async fn stop(&self, handle: &InstanceHandle) -> Result<(), PlatformError>;

    /// Release the instance and all its resources
    async fn delete(&self, handle: &InstanceHandle) -> Result<(), PlatformError>;

    async fn is_running(&self, handle: &InstanceHandle) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let secrets = NodeSecrets {
            swarm_key: Some("super-secret".into()),
            ..Default::default()
        };
        let printed = format!("{:?}", secrets);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_spec_env() {
        let spec = NodeSpec {
            name: "bee-0".into(),
            namespace: "swarm".into(),
            bootnode: true,
            profile: NodeGroupProfile::default(),
            config: BeeConfig {
                bootnodes: "/dns4/bee-1/tcp/1634".into(),
                ..Default::default()
            },
            secrets: NodeSecrets {
                clef_password: Some("pw".into()),
                ..Default::default()
            },
        };
        let env = spec.env();
        assert_eq!(env["NODE_NAME"], "bee-0");
        assert_eq!(env["NAMESPACE"], "swarm");
        assert_eq!(env["NODE_BOOTNODE"], "true");
        assert_eq!(env["BEE_BOOTNODES"], "/dns4/bee-1/tcp/1634");
        assert_eq!(env["NODE_CLEF_PASSWORD"], "pw");
        assert!(!env.contains_key("NODE_SWARM_KEY"));
    }
}
