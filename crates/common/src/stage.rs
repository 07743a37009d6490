//! Staged scaling of a live cluster
//!
//! Stages run one after another. Within a stage every [`Update`] runs
//! concurrently, and within an update the four action categories run in
//! the fixed order add, start, stop, delete, each category concurrent
//! within itself. Node selection follows sorted name order: start takes
//! nodes that are not running, stop takes running nodes (attached ones
//! included) and delete takes nodes that are not stopped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cluster::{
    Cluster, ClusterError, NodeGroup, NodeGroupError, NodeOptions, NodeState,
};
use crate::config::{BeeConfig, Config, ConfigError, GroupMode, NodeGroupProfile};
use crate::deadline::Interrupted;
use crate::tasks::TaskGroup;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Actions {
    /// Register this many new nodes, without starting them
    pub add_count: usize,
    pub start_count: usize,
    pub stop_count: usize,
    pub delete_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Update {
    pub node_group: String,
    #[serde(flatten)]
    pub actions: Actions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Stage {
    #[serde(default)]
    pub updates: Vec<Update>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Start,
    Stop,
    Delete,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Start => "start",
            Category::Stop => "stop",
            Category::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("stage {stage}: {source}")]
    Cluster {
        stage: usize,
        #[source]
        source: ClusterError,
    },
    #[error("stage {stage}, node group {group}: {source}")]
    Group {
        stage: usize,
        group: String,
        #[source]
        source: NodeGroupError,
    },
    #[error("stage {stage}, node group {group}: cannot {action} {requested} nodes, {eligible} eligible")]
    NotEnoughNodes {
        stage: usize,
        group: String,
        action: String,
        requested: usize,
        eligible: usize,
    },
    #[error("stage {stage}: update failed: {reason}")]
    Task { stage: usize, reason: String },
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Settings for groups a stage creates on first use
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupTemplate {
    pub profile: NodeGroupProfile,
    pub bee_config: BeeConfig,
}

#[derive(Debug, Clone)]
pub struct StageExecutor {
    cluster: Cluster,
    templates: BTreeMap<String, GroupTemplate>,
}

impl StageExecutor {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            templates: BTreeMap::new(),
        }
    }

    /// Executor that can recreate every configured group
    pub fn from_config(cluster: Cluster, config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(cluster).with_templates(group_templates(config)?))
    }

    pub fn with_template(mut self, group: impl Into<String>, template: GroupTemplate) -> Self {
        self.templates.insert(group.into(), template);
        self
    }

    pub fn with_templates(mut self, templates: BTreeMap<String, GroupTemplate>) -> Self {
        self.templates.extend(templates);
        self
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Apply `stages` in order, stopping at the first failed stage
    pub async fn run(&self, stages: &[Stage]) -> Result<(), StageError> {
        for (index, stage) in stages.iter().enumerate() {
            self.apply(index, stage).await?;
        }
        Ok(())
    }

    /// Apply a single stage; `index` only labels logs and errors
    pub async fn apply(&self, index: usize, stage: &Stage) -> Result<(), StageError> {
        tracing::info!(stage = index, updates = stage.updates.len(), "applying stage");

        let resolved = stage
            .updates
            .iter()
            .map(|update| Ok((self.resolve_group(index, &update.node_group)?, update.actions)))
            .collect::<Result<Vec<_>, StageError>>()?;

        let mut tasks = TaskGroup::new();
        for (group, actions) in resolved {
            tasks.spawn(async move { apply_actions(index, group, actions).await });
        }
        tasks
            .wait(|e| StageError::Task {
                stage: index,
                reason: e.to_string(),
            })
            .await?;

        tracing::info!(stage = index, nodes = self.cluster.node_count(), "stage applied");
        Ok(())
    }

    fn resolve_group(&self, stage: usize, name: &str) -> Result<NodeGroup, StageError> {
        self.cluster
            .node_group_or_insert_with(name, || {
                let template = self
                    .templates
                    .get(name)
                    .ok_or_else(|| ClusterError::NodeGroupNotFound(name.to_string()))?;
                tracing::info!(stage, group = %name, "creating node group from profile");
                Ok((template.profile.clone(), template.bee_config.clone()))
            })
            .map_err(|source| StageError::Cluster { stage, source })
    }
}

/// Templates for every configured group; peer groups get the configured
/// bootnode list
pub fn group_templates(config: &Config) -> Result<BTreeMap<String, GroupTemplate>, ConfigError> {
    let namespace = config.cluster.namespace.as_str();
    let bootnodes = config
        .cluster
        .node_groups
        .values()
        .filter(|g| g.mode == GroupMode::Bootnode)
        .flat_map(|g| g.nodes.iter().map(|n| n.bootnode_address(namespace)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut templates = BTreeMap::new();
    for (name, definition) in &config.cluster.node_groups {
        let profile = config.node_group_profile(name, &definition.config)?;
        let mut bee_config = config.bee_profile(name, &definition.bee_config)?;
        if definition.mode == GroupMode::Node {
            bee_config.bootnodes = bootnodes.clone();
        }
        templates.insert(
            name.clone(),
            GroupTemplate {
                profile,
                bee_config,
            },
        );
    }
    Ok(templates)
}

async fn apply_actions(stage: usize, group: NodeGroup, actions: Actions) -> Result<(), StageError> {
    let group_err = |source| StageError::Group {
        stage,
        group: group.name().to_string(),
        source,
    };

    for name in group.unused_names(actions.add_count) {
        group
            .add_node(name, NodeOptions::default())
            .map_err(group_err)?;
    }

    let not_running: Vec<String> = group
        .nodes()
        .into_iter()
        .filter(|n| !n.is_running())
        .map(|n| n.name().to_string())
        .collect();
    run_category(stage, &group, Category::Start, not_running, actions.start_count).await?;

    let running = group.nodes_in_state(NodeState::Running);
    run_category(stage, &group, Category::Stop, running, actions.stop_count).await?;

    // nodes stopped above stay registered and count as stopped, not deleted
    let not_stopped: Vec<String> = group
        .nodes()
        .into_iter()
        .filter(|n| n.state() != NodeState::Stopped)
        .map(|n| n.name().to_string())
        .collect();
    run_category(stage, &group, Category::Delete, not_stopped, actions.delete_count).await?;

    tracing::debug!(stage, group = %group.name(), ?actions, "update applied");
    Ok(())
}

/// Run `category` on the first `count` of `eligible`, concurrently
async fn run_category(
    stage: usize,
    group: &NodeGroup,
    category: Category,
    eligible: Vec<String>,
    count: usize,
) -> Result<(), StageError> {
    if count == 0 {
        return Ok(());
    }
    if eligible.len() < count {
        return Err(StageError::NotEnoughNodes {
            stage,
            group: group.name().to_string(),
            action: category.to_string(),
            requested: count,
            eligible: eligible.len(),
        });
    }

    let mut tasks = TaskGroup::new();
    for name in eligible.into_iter().take(count) {
        let group = group.clone();
        tasks.spawn(async move {
            match category {
                Category::Start => group.start_node(&name).await,
                Category::Stop => group.stop_node(&name).await,
                Category::Delete => group.delete_node(&name).await,
            }
        });
    }
    tasks
        .wait(|e| NodeGroupError::Task(e.to_string()))
        .await
        .map_err(|source| StageError::Group {
            stage,
            group: group.name().to_string(),
            source,
        })
}
