use clap::Args;

use common::check::{CheckKind, RetrievalOptions};

use super::{run_check, CheckOpError};

/// Upload random chunks and download them from the last node
#[derive(Args, Debug, Clone)]
pub struct Retrieval {
    #[arg(long, default_value = "bee")]
    pub node_group: String,

    /// Number of nodes that upload chunks
    #[arg(long, default_value_t = 1)]
    pub upload_node_count: usize,

    #[arg(long, default_value_t = 1)]
    pub chunks_per_node: usize,

    /// Seed for chunk generation; random when unset
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Retrieval {
    type Error = CheckOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let options = RetrievalOptions {
            node_group: self.node_group.clone(),
            upload_node_count: self.upload_node_count,
            chunks_per_node: self.chunks_per_node,
        };
        run_check(ctx, self.seed, CheckKind::Retrieval(options)).await
    }
}
