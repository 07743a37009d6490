use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{check_upload_count, Check, CheckError, RunContext, METRICS_NAMESPACE};
use crate::api::UploadOptions;
use crate::cluster::Cluster;
use crate::content::Chunk;
use crate::metrics::{metric_name, Collector, CounterVec, HistogramVec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub node_group: String,
    pub upload_node_count: usize,
    pub chunks_per_node: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            node_group: "bee".to_string(),
            upload_node_count: 1,
            chunks_per_node: 1,
        }
    }
}

#[derive(Debug)]
struct RetrievalMetrics {
    uploaded: Arc<CounterVec>,
    downloaded: Arc<CounterVec>,
    not_retrieved: Arc<CounterVec>,
    upload_time: Arc<HistogramVec>,
    download_time: Arc<HistogramVec>,
}

impl RetrievalMetrics {
    fn new() -> Self {
        let name = |n| metric_name(METRICS_NAMESPACE, "check_retrieval", n);
        Self {
            uploaded: Arc::new(CounterVec::new(
                name("chunks_uploaded_total"),
                "Number of uploaded chunks.",
                &["node"],
            )),
            downloaded: Arc::new(CounterVec::new(
                name("chunks_downloaded_total"),
                "Number of downloaded chunks that matched their upload.",
                &["node"],
            )),
            not_retrieved: Arc::new(CounterVec::new(
                name("chunks_not_retrieved_total"),
                "Number of downloaded chunks that did not match their upload.",
                &["node"],
            )),
            upload_time: Arc::new(HistogramVec::new(
                name("chunk_upload_duration_seconds"),
                "Chunk upload duration.",
                &["node"],
            )),
            download_time: Arc::new(HistogramVec::new(
                name("chunk_download_duration_seconds"),
                "Chunk download duration.",
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

/// Upload chunks through the first nodes, retrieve them from the last one
#[derive(Debug, Clone, Copy, Default)]
pub struct Retrieval;

#[async_trait]
impl Check for Retrieval {
    type Options = RetrievalOptions;

    fn name(&self) -> &'static str {
        "retrieval"
    }

    async fn run(
        &self,
        cluster: &Cluster,
        options: &RetrievalOptions,
        ctx: &RunContext,
    ) -> Result<(), CheckError> {
        let group = cluster.node_group(&options.node_group)?;
        let nodes = check_upload_count(&group, options.upload_node_count)?;
        let metrics = RetrievalMetrics::new();
        ctx.register(metrics.collectors());

        // nodes is non empty once the count is validated
        let downloader = nodes[nodes.len() - 1].as_str();
        let download_client = group.node_client(downloader)?;
        let mut generators = ctx.generators(options.upload_node_count);

        for (index, (node, rng)) in nodes.iter().zip(generators.iter_mut()).enumerate() {
            let client = group.node_client(node)?;
            let label = node.as_str();

            for i in 0..options.chunks_per_node {
                let chunk = Chunk::random(rng);

                let start = Instant::now();
                let address = client
                    .upload_chunk(chunk.data(), UploadOptions::default())
                    .await
                    .map_err(CheckError::api(node))?;
                metrics.upload_time.observe_duration(&[label], start.elapsed());
                metrics.uploaded.inc(&[label]);
                if address != chunk.address() {
                    tracing::warn!(
                        node = %node,
                        expected = %chunk.address(),
                        reported = %address,
                        "node reported an unexpected chunk address"
                    );
                }

                let start = Instant::now();
                let data = download_client
                    .download_chunk(&address)
                    .await
                    .map_err(CheckError::api(downloader))?;
                metrics.download_time.observe_duration(&[label], start.elapsed());

                if data != *chunk.data() {
                    metrics.not_retrieved.inc(&[label]);
                    tracing::error!(
                        node = %node,
                        downloader = %downloader,
                        address = %address,
                        uploaded = chunk.data().len(),
                        downloaded = data.len(),
                        "Node {}. Chunk {} not retrieved successfully",
                        index,
                        i
                    );
                    if is_subset(chunk.data(), &data) {
                        tracing::error!(
                            node = %node,
                            address = %address,
                            "Downloaded data is subset of the uploaded data"
                        );
                    }
                    ctx.push().await;
                    return Err(CheckError::VerificationMismatch {
                        node: downloader.to_string(),
                        unit: "chunk",
                        address,
                        expected: chunk.data().len(),
                        actual: data.len(),
                    });
                }

                metrics.downloaded.inc(&[label]);
                tracing::info!(
                    node = %node,
                    address = %address,
                    "Node {}. Chunk {} retrieved successfully from {}",
                    index,
                    i,
                    downloader
                );
                ctx.push().await;
            }
        }

        Ok(())
    }
}

/// Whether `downloaded` appears contiguously within `uploaded`
fn is_subset(uploaded: &[u8], downloaded: &[u8]) -> bool {
    downloaded.is_empty()
        || uploaded
            .windows(downloaded.len())
            .any(|window| window == downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_download_is_subset() {
        let uploaded = b"\x04\x00\x00\x00\x00\x00\x00\x00swarm";
        assert!(is_subset(uploaded, b"swar"));
        assert!(is_subset(uploaded, b"arm"));
        assert!(is_subset(uploaded, b""));
        assert!(!is_subset(uploaded, b"swarms"));
        assert!(!is_subset(uploaded, b"sward"));
    }
}
