use clap::Args;

use common::check::{CheckKind, PingOptions};
use common::stage::group_templates;

use super::{run_check, CheckOpError};

/// Ping every node from every other node
#[derive(Args, Debug, Clone)]
pub struct Ping {
    /// Only ping within this group
    #[arg(long)]
    pub node_group: Option<String>,

    /// Apply the configured stages one by one, pinging after each
    #[arg(long)]
    pub dynamic: bool,

    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ping {
    type Error = CheckOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut options = PingOptions {
            node_group: self.node_group.clone(),
            dynamic: self.dynamic,
            ..Default::default()
        };
        if self.dynamic {
            let config = ctx.load_config()?;
            options.templates = group_templates(&config)?;
            options.stages = config.stages;
        }
        run_check(ctx, self.seed, CheckKind::Ping(options)).await
    }
}
