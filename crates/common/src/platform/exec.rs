use std::collections::{BTreeMap, HashSet};
use std::process::Output;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{InstanceHandle, NodeSpec, Platform, PlatformError};

fn default_shell() -> String {
    "sh".to_string()
}

/// Shell commands used to drive an external orchestrator
///
/// Each command runs through `shell -c` with the node described in the
/// environment (`NODE_NAME`, `NAMESPACE`, `NODE_IMAGE`, `BEE_*`, ...), so a
/// deployment can wrap docker, kubectl or anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecPlatformConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    pub create: String,
    pub stop: String,
    pub delete: String,
    /// Exits zero while the instance runs; running state is tracked
    /// locally when unset
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug)]
pub struct ExecPlatform {
    config: ExecPlatformConfig,
    running: Mutex<HashSet<InstanceHandle>>,
}

impl ExecPlatform {
    pub fn new(config: ExecPlatformConfig) -> Self {
        Self {
            config,
            running: Mutex::new(HashSet::new()),
        }
    }

    async fn output(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<Output, PlatformError> {
        tracing::debug!(
            command,
            node = env.get("NODE_NAME").map(String::as_str),
            "running platform command"
        );
        let output = Command::new(&self.config.shell)
            .arg("-c")
            .arg(command)
            .envs(env)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }

    async fn run_checked(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<(), PlatformError> {
        let output = self.output(command, env).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(PlatformError::Command {
            command: command.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn handle_env(handle: &InstanceHandle) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("NODE_NAME".to_string(), handle.name.clone()),
        ("NAMESPACE".to_string(), handle.namespace.clone()),
    ])
}

#[async_trait]
impl Platform for ExecPlatform {
    async fn create(&self, spec: &NodeSpec) -> Result<InstanceHandle, PlatformError> {
        self.run_checked(&self.config.create, &spec.env()).await?;
        let handle = InstanceHandle {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
        };
        self.running.lock().insert(handle.clone());
        Ok(handle)
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), PlatformError> {
        self.run_checked(&self.config.stop, &handle_env(handle)).await?;
        self.running.lock().remove(handle);
        Ok(())
    }

    async fn delete(&self, handle: &InstanceHandle) -> Result<(), PlatformError> {
        self.run_checked(&self.config.delete, &handle_env(handle))
            .await?;
        self.running.lock().remove(handle);
        Ok(())
    }

    async fn is_running(&self, handle: &InstanceHandle) -> bool {
        match &self.config.status {
            Some(status) => match self.output(status, &handle_env(handle)).await {
                Ok(output) => output.status.success(),
                Err(e) => {
                    tracing::warn!(instance = %handle, "status command failed: {}", e);
                    false
                }
            },
            None => self.running.lock().contains(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BeeConfig, NodeGroupProfile};
    use crate::platform::NodeSecrets;

    fn spec(name: &str) -> NodeSpec {
        NodeSpec {
            name: name.into(),
            namespace: "test".into(),
            bootnode: false,
            profile: NodeGroupProfile::default(),
            config: BeeConfig::default(),
            secrets: NodeSecrets::default(),
        }
    }

    #[tokio::test]
    async fn test_commands_see_node_env() {
        let dir = tempfile::tempdir().unwrap();
        let platform = ExecPlatform::new(ExecPlatformConfig {
            shell: default_shell(),
            create: format!("touch {}/$NODE_NAME", dir.path().display()),
            stop: "true".into(),
            delete: format!("rm {}/$NODE_NAME", dir.path().display()),
            status: Some(format!("test -f {}/$NODE_NAME", dir.path().display())),
        });

        let handle = platform.create(&spec("bee-0")).await.unwrap();
        assert!(dir.path().join("bee-0").exists());
        assert!(platform.is_running(&handle).await);

        platform.delete(&handle).await.unwrap();
        assert!(!dir.path().join("bee-0").exists());
        assert!(!platform.is_running(&handle).await);
    }

    #[tokio::test]
    async fn test_failed_command_surfaces_stderr() {
        let platform = ExecPlatform::new(ExecPlatformConfig {
            shell: default_shell(),
            create: "echo boom >&2; exit 3".into(),
            stop: "true".into(),
            delete: "true".into(),
            status: None,
        });

        let err = platform.create(&spec("bee-0")).await.unwrap_err();
        match err {
            PlatformError::Command { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_tracks_running_without_status_command() {
        let platform = ExecPlatform::new(ExecPlatformConfig {
            shell: default_shell(),
            create: "true".into(),
            stop: "true".into(),
            delete: "true".into(),
            status: None,
        });

        let handle = platform.create(&spec("drone-0")).await.unwrap();
        assert!(platform.is_running(&handle).await);
        platform.stop(&handle).await.unwrap();
        assert!(!platform.is_running(&handle).await);
    }
}
