use clap::{Args, Subcommand};

pub mod delete;
pub mod setup;
pub mod stages;

use common::cluster::{ClusterError, StartMode};
use common::config::ConfigError;
use common::deadline::Interrupted;
use common::stage::StageError;

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Setup, setup::Setup),
    (Delete, delete::Delete),
    (Stages, stages::Stages),
}

pub type ClusterCommand = Command;

/// Provision, scale and tear down the configured cluster
#[derive(Args, Debug, Clone)]
pub struct Cluster {
    #[command(subcommand)]
    pub command: ClusterCommand,
}

#[async_trait::async_trait]
impl Op for Cluster {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterOpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Provision nodes when `start` is set, otherwise attach to running ones
pub(crate) fn start_mode(start: bool) -> StartMode {
    if start {
        StartMode::Start
    } else {
        StartMode::Attach
    }
}
