use clap::Args;

use common::check::{CheckKind, PinRemoteOptions};

use super::{run_check, CheckOpError};

/// Pin a chunk on a node that did not upload it and flood its store
#[derive(Args, Debug, Clone)]
pub struct PinRemote {
    #[arg(long, default_value = "bee")]
    pub node_group: String,

    /// Local store capacity of a node, in chunks
    #[arg(long, default_value_t = 1000)]
    pub db_capacity: u64,

    /// Filler uploaded per round is db-capacity / capacity-divisor
    #[arg(long, default_value_t = 3)]
    pub capacity_divisor: u64,

    /// Seed for pivot selection and chunk generation; random when unset
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for PinRemote {
    type Error = CheckOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let options = PinRemoteOptions {
            node_group: self.node_group.clone(),
            store_size: self.db_capacity,
            capacity_divisor: self.capacity_divisor,
        };
        run_check(ctx, self.seed, CheckKind::PinRemote(options)).await
    }
}
