use clap::Args;

use common::check::{megabytes, CheckKind, FileRetrievalOptions};

use super::{run_check, CheckOpError};

/// Upload random files and download them again
#[derive(Args, Debug, Clone)]
pub struct FileRetrieval {
    #[arg(long, default_value = "bee")]
    pub node_group: String,

    /// Number of nodes that upload files
    #[arg(long, default_value_t = 1)]
    pub upload_node_count: usize,

    #[arg(long, default_value_t = 1)]
    pub files_per_node: usize,

    /// File size in megabytes
    #[arg(long, default_value_t = 1.0)]
    pub file_size: f64,

    #[arg(long, default_value = "file")]
    pub file_name: String,

    /// Download from every other node, not only the last one
    #[arg(long)]
    pub full: bool,

    /// Seed for file generation; random when unset
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,
}

impl FileRetrieval {
    pub fn options(&self) -> FileRetrievalOptions {
        FileRetrievalOptions {
            node_group: self.node_group.clone(),
            upload_node_count: self.upload_node_count,
            files_per_node: self.files_per_node,
            file_size: megabytes(self.file_size),
            file_name: self.file_name.clone(),
            full: self.full,
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for FileRetrieval {
    type Error = CheckOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        run_check(ctx, self.seed, CheckKind::FileRetrieval(self.options())).await
    }
}
