use clap::Args;

use common::cluster::setup_cluster;
use tracing::Instrument;

use crate::logging::cluster_span;

use super::{start_mode, ClusterOpError};

/// Build the cluster from its configuration
#[derive(Args, Debug, Clone)]
pub struct Setup {
    /// Provision and start every node instead of attaching to running ones
    #[arg(long)]
    pub start: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Setup {
    type Error = ClusterOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.load_config()?;
        let options = ctx.cluster_options(&config);
        let span = cluster_span("setup", &config.cluster.name, &config.cluster.namespace);
        let cluster = ctx
            .bounded(async {
                Ok::<_, ClusterOpError>(setup_cluster(&config, options, start_mode(self.start)).await?)
            })
            .instrument(span)
            .await?;

        let groups = cluster
            .node_groups()
            .iter()
            .map(|g| format!("{} ({} nodes)", g.name(), g.len()))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "cluster {} ready: {} nodes in {}",
            cluster.name(),
            cluster.node_count(),
            groups
        ))
    }
}
