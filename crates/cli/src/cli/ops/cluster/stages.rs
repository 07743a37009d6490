use clap::Args;

use common::cluster::setup_cluster;
use common::stage::StageExecutor;
use tracing::Instrument;

use crate::logging::cluster_span;

use super::{start_mode, ClusterOpError};

/// Apply the configured stages in order
#[derive(Args, Debug, Clone)]
pub struct Stages {
    /// Provision the cluster first instead of attaching to it
    #[arg(long)]
    pub start: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Stages {
    type Error = ClusterOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.load_config()?;
        let options = ctx.cluster_options(&config);
        let mode = start_mode(self.start);
        let span = cluster_span("stages", &config.cluster.name, &config.cluster.namespace);

        let cluster = ctx
            .bounded(async {
                let cluster = setup_cluster(&config, options, mode).await?;
                StageExecutor::from_config(cluster.clone(), &config)?
                    .run(&config.stages)
                    .await?;
                Ok::<_, ClusterOpError>(cluster)
            })
            .instrument(span)
            .await?;

        Ok(format!(
            "applied {} stages: {} nodes registered",
            config.stages.len(),
            cluster.node_count()
        ))
    }
}
