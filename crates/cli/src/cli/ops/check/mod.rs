use clap::{Args, Subcommand};

pub mod file_retrieval;
pub mod pin_remote;
pub mod ping;
pub mod retrieval;

use common::check::{CheckError, CheckKind, CheckRunner};
use common::cluster::{setup_cluster, ClusterError, StartMode};
use common::config::ConfigError;
use common::deadline::Interrupted;
use common::metrics::MetricsError;
use common::random::random_seed;

use tracing::Instrument;

use crate::cli::op::{Op, OpContext};

crate::command_enum! {
    (Retrieval, retrieval::Retrieval),
    (FileRetrieval, file_retrieval::FileRetrieval),
    (PinRemote, pin_remote::PinRemote),
    (Ping, ping::Ping),
}

pub type CheckCommand = Command;

/// Run a verification scenario against a running cluster
#[derive(Args, Debug, Clone)]
pub struct Check {
    #[command(subcommand)]
    pub command: CheckCommand,
}

#[async_trait::async_trait]
impl Op for Check {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckOpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Attach to the configured cluster and run `kind` with `seed`
pub(crate) async fn run_check(
    ctx: &OpContext,
    seed: Option<i64>,
    kind: CheckKind,
) -> Result<String, CheckOpError> {
    let seed = seed.unwrap_or_else(random_seed);
    println!("Seed: {}", seed);

    let config = ctx.load_config()?;
    let metrics = ctx.metrics(&config.cluster.namespace)?;
    let options = ctx.cluster_options(&config);

    let span = crate::logging::check_span(kind.name(), seed, &config.cluster.namespace);
    ctx.bounded(async {
        let cluster = setup_cluster(&config, options, StartMode::Attach).await?;
        let report = CheckRunner::new(cluster)
            .with_seed(Some(seed))
            .with_metrics(metrics)
            .run(&kind)
            .await?;
        Ok::<_, CheckOpError>(format!(
            "check {} passed in {:.2?}",
            report.check, report.duration
        ))
    })
    .instrument(span)
    .await
}
