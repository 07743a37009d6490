use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use super::{check_upload_count, Check, CheckError, RunContext, METRICS_NAMESPACE};
use crate::api::UploadOptions;
use crate::cluster::Cluster;
use crate::content::{keccak256, RandomFile};
use crate::metrics::{metric_name, Collector, CounterVec, HistogramVec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRetrievalOptions {
    pub node_group: String,
    pub upload_node_count: usize,
    pub files_per_node: usize,
    /// File size in bytes
    pub file_size: usize,
    pub file_name: String,
    /// Retrieve from every other node instead of only the last one
    pub full: bool,
}

impl Default for FileRetrievalOptions {
    fn default() -> Self {
        Self {
            node_group: "bee".to_string(),
            upload_node_count: 1,
            files_per_node: 1,
            file_size: 1024 * 1024,
            file_name: "file".to_string(),
            full: false,
        }
    }
}

/// Convert a size in megabytes, as taken on the command line, to bytes
pub fn megabytes(size: f64) -> usize {
    (size * 1024.0 * 1024.0).round().max(0.0) as usize
}

#[derive(Debug)]
struct FileRetrievalMetrics {
    uploaded: Arc<CounterVec>,
    downloaded: Arc<CounterVec>,
    not_retrieved: Arc<CounterVec>,
    upload_time: Arc<HistogramVec>,
    download_time: Arc<HistogramVec>,
}

impl FileRetrievalMetrics {
    fn new() -> Self {
        let name = |n| metric_name(METRICS_NAMESPACE, "check_file_retrieval", n);
        Self {
            uploaded: Arc::new(CounterVec::new(
                name("files_uploaded_total"),
                "Number of uploaded files.",
                &["node"],
            )),
            downloaded: Arc::new(CounterVec::new(
                name("files_downloaded_total"),
                "Number of downloaded files that matched their upload.",
                &["node"],
            )),
            not_retrieved: Arc::new(CounterVec::new(
                name("files_not_retrieved_total"),
                "Number of downloaded files that did not match their upload.",
                &["node"],
            )),
            upload_time: Arc::new(HistogramVec::new(
                name("file_upload_duration_seconds"),
                "File upload duration.",
                &["node"],
            )),
            download_time: Arc::new(HistogramVec::new(
                name("file_download_duration_seconds"),
                "File download duration.",
                &["node"],
            )),
        }
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![
            self.uploaded.clone() as Arc<dyn Collector>,
            self.downloaded.clone() as Arc<dyn Collector>,
            self.not_retrieved.clone() as Arc<dyn Collector>,
            self.upload_time.clone() as Arc<dyn Collector>,
            self.download_time.clone() as Arc<dyn Collector>,
        ]
    }
}

/// Upload random files and compare what other nodes return by digest
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRetrieval;

#[async_trait]
impl Check for FileRetrieval {
    type Options = FileRetrievalOptions;

    fn name(&self) -> &'static str {
        "file-retrieval"
    }

    async fn run(
        &self,
        cluster: &Cluster,
        options: &FileRetrievalOptions,
        ctx: &RunContext,
    ) -> Result<(), CheckError> {
        if options.file_size == 0 {
            return Err(CheckError::BadParameters(
                "file size must be positive".to_string(),
            ));
        }
        let group = cluster.node_group(&options.node_group)?;
        let nodes = check_upload_count(&group, options.upload_node_count)?;
        let metrics = FileRetrievalMetrics::new();
        ctx.register(metrics.collectors());

        let last = nodes[nodes.len() - 1].clone();
        let mut generators = ctx.generators(options.upload_node_count);

        for (index, (node, rng)) in nodes.iter().zip(generators.iter_mut()).enumerate() {
            let client = group.node_client(node)?;
            let label = node.as_str();

            let targets: Vec<&String> = if options.full {
                nodes.iter().filter(|n| *n != node).collect()
            } else {
                vec![&last]
            };

            for i in 0..options.files_per_node {
                let name = format!("{}-{}-{}", options.file_name, index, i);
                let file = RandomFile::new(rng, name, options.file_size);

                let start = Instant::now();
                let address = client
                    .upload_file(file.name(), file.data(), UploadOptions::default())
                    .await
                    .map_err(CheckError::api(node))?;
                metrics.upload_time.observe_duration(&[label], start.elapsed());
                metrics.uploaded.inc(&[label]);

                for target in &targets {
                    let target_client = group.node_client(target)?;
                    let start = Instant::now();
                    let data: Bytes = target_client
                        .download_file(&address)
                        .await
                        .map_err(CheckError::api(target))?;
                    metrics.download_time.observe_duration(&[label], start.elapsed());

                    if !file.matches(&data) {
                        metrics.not_retrieved.inc(&[label]);
                        tracing::error!(
                            node = %node,
                            downloader = %target,
                            address = %address,
                            uploaded = file.size(),
                            downloaded = data.len(),
                            uploaded_hash = %hex::encode(file.hash()),
                            downloaded_hash = %hex::encode(keccak256(&data)),
                            "Node {}. File {} not retrieved successfully",
                            index,
                            i
                        );
                        ctx.push().await;
                        return Err(CheckError::VerificationMismatch {
                            node: target.to_string(),
                            unit: "file",
                            address,
                            expected: file.size(),
                            actual: data.len(),
                        });
                    }

                    metrics.downloaded.inc(&[label]);
                    tracing::info!(
                        node = %node,
                        address = %address,
                        "Node {}. File {} retrieved successfully from {}",
                        index,
                        i,
                        target
                    );
                    ctx.push().await;
                }
            }
        }

        Ok(())
    }
}
