//! Verification scenarios
//!
//! Every scenario implements [`Check`] with its own strongly typed options
//! and is selected through the closed [`CheckKind`] enum. A run owns a
//! [`RunContext`]: the resolved seed the per-node random streams derive
//! from, and the metrics sink, if any. Scenarios stop at the first
//! verification failure.

mod file_retrieval;
mod pin_remote;
mod ping;
mod retrieval;
mod runner;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::ApiError;
use crate::cluster::{Cluster, ClusterError, NodeGroup, NodeGroupError, NodeState};
use crate::content::SwarmAddress;
use crate::deadline::Interrupted;
use crate::metrics::{Collector, MetricsSink};
use crate::random::{pseudo_generator, pseudo_generators, PseudoRng};
use crate::stage::StageError;

pub use file_retrieval::{megabytes, FileRetrieval, FileRetrievalOptions};
pub use pin_remote::{PinRemote, PinRemoteOptions};
pub use ping::{Ping, PingOptions};
pub use retrieval::{Retrieval, RetrievalOptions};
pub use runner::{CheckReport, CheckRunner};

/// Prefix of every metric a check exports
pub const METRICS_NAMESPACE: &str = "swarmkeeper";

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{unit} {address} retrieved from node {node} does not match: uploaded {expected} bytes, downloaded {actual} bytes")]
    VerificationMismatch {
        node: String,
        unit: &'static str,
        address: SwarmAddress,
        expected: usize,
        actual: usize,
    },
    #[error("chunk {address} is no longer {reason} on node {node} after round {round}")]
    PinLost {
        node: String,
        address: SwarmAddress,
        round: u64,
        reason: &'static str,
    },
    #[error("bad parameters: {0}")]
    BadParameters(String),
    #[error("node {node}: {source}")]
    Api {
        node: String,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Group(#[from] NodeGroupError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl CheckError {
    /// Wrap an API failure with the node it came from
    pub(crate) fn api(node: &str) -> impl Fn(ApiError) -> CheckError + '_ {
        move |source| CheckError::Api {
            node: node.to_string(),
            source,
        }
    }
}

/// A verification scenario
#[async_trait]
pub trait Check: Send + Sync {
    type Options: Send + Sync + Debug;

    fn name(&self) -> &'static str;

    async fn run(
        &self,
        cluster: &Cluster,
        options: &Self::Options,
        ctx: &RunContext,
    ) -> Result<(), CheckError>;
}

/// Every scenario, each carrying its own options
#[derive(Debug, Clone)]
pub enum CheckKind {
    Retrieval(RetrievalOptions),
    FileRetrieval(FileRetrievalOptions),
    PinRemote(PinRemoteOptions),
    Ping(PingOptions),
}

impl CheckKind {
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Retrieval(_) => Retrieval.name(),
            CheckKind::FileRetrieval(_) => FileRetrieval.name(),
            CheckKind::PinRemote(_) => PinRemote.name(),
            CheckKind::Ping(_) => Ping.name(),
        }
    }

    pub async fn run(&self, cluster: &Cluster, ctx: &RunContext) -> Result<(), CheckError> {
        match self {
            CheckKind::Retrieval(options) => Retrieval.run(cluster, options, ctx).await,
            CheckKind::FileRetrieval(options) => FileRetrieval.run(cluster, options, ctx).await,
            CheckKind::PinRemote(options) => PinRemote.run(cluster, options, ctx).await,
            CheckKind::Ping(options) => Ping.run(cluster, options, ctx).await,
        }
    }
}

/// State shared by everything a single check run does
#[derive(Debug, Clone)]
pub struct RunContext {
    seed: i64,
    metrics: Option<Arc<dyn MetricsSink>>,
    registered: Arc<Mutex<Vec<String>>>,
}

impl RunContext {
    pub fn new(seed: i64, metrics: Option<Arc<dyn MetricsSink>>) -> Self {
        Self {
            seed,
            metrics,
            registered: Arc::default(),
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// One stream per participating node, indexed by sorted position
    pub fn generators(&self, count: usize) -> Vec<PseudoRng> {
        pseudo_generators(self.seed, count)
    }

    /// A single stream for scenarios driven from one place
    pub fn generator(&self) -> PseudoRng {
        pseudo_generator(self.seed)
    }

    /// Register a run's collectors; failures are logged, not fatal
    pub fn register(&self, collectors: Vec<Arc<dyn Collector>>) {
        let Some(sink) = &self.metrics else {
            return;
        };
        for collector in collectors {
            let name = collector.name().to_string();
            match sink.register(collector) {
                Ok(()) => self.registered.lock().push(name),
                Err(e) => tracing::warn!("metrics registration failed: {}", e),
            }
        }
    }

    /// Drop every collector this run registered
    pub fn finish(&self) {
        let Some(sink) = &self.metrics else {
            return;
        };
        for name in self.registered.lock().drain(..) {
            sink.unregister(&name);
        }
    }

    /// Push current metrics; failures are logged, not fatal
    pub async fn push(&self) {
        let Some(sink) = &self.metrics else {
            return;
        };
        if let Err(e) = sink.push().await {
            tracing::warn!("metrics push failed: {}", e);
        }
    }
}

/// Sorted names of the running nodes of `group`, checking that at least
/// `min` exist
pub(crate) fn sorted_nodes(group: &NodeGroup, min: usize) -> Result<Vec<String>, CheckError> {
    let nodes = group.nodes_in_state(NodeState::Running);
    if nodes.len() < min {
        return Err(CheckError::BadParameters(format!(
            "node group {} has {} running nodes, at least {} required",
            group.name(),
            nodes.len(),
            min
        )));
    }
    Ok(nodes)
}

/// Validate an upload node count against the group size
pub(crate) fn check_upload_count(
    group: &NodeGroup,
    upload_node_count: usize,
) -> Result<Vec<String>, CheckError> {
    if upload_node_count == 0 {
        return Err(CheckError::BadParameters(
            "upload node count must be at least 1".to_string(),
        ));
    }
    let nodes = sorted_nodes(group, 1)?;
    if upload_node_count > nodes.len() {
        return Err(CheckError::BadParameters(format!(
            "upload node count {} exceeds node count {} of group {}",
            upload_node_count,
            nodes.len(),
            group.name()
        )));
    }
    Ok(nodes)
}
