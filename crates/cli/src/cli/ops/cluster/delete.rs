use clap::Args;

use common::cluster::delete_cluster;
use tracing::Instrument;

use crate::logging::cluster_span;

use super::ClusterOpError;

/// Delete every node the configuration declares
#[derive(Args, Debug, Clone)]
pub struct Delete;

#[async_trait::async_trait]
impl crate::cli::op::Op for Delete {
    type Error = ClusterOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.load_config()?;
        let options = ctx.cluster_options(&config);
        let span = cluster_span("delete", &config.cluster.name, &config.cluster.namespace);
        ctx.bounded(async {
            Ok::<_, ClusterOpError>(delete_cluster(&config, options).await?)
        })
        .instrument(span)
        .await?;
        Ok(format!("cluster {} deleted", config.cluster.name))
    }
}
