/**
 * Node control API: the HTTP client for a node's
 *  public and debug surfaces, and the trait
 *  the rest of the crate talks through.
 */
pub mod api;
/**
 * Verification scenarios and the runner that
 *  drives them against a cluster.
 */
pub mod check;
/**
 * Cluster, node group and node lifecycle,
 *  including two-phase cluster setup.
 */
pub mod cluster;
pub mod config;
/**
 * Chunks, files and the content addresses
 *  derived from them.
 */
pub mod content;
pub mod deadline;
pub mod metrics;
/**
 * Provisioning seam: whatever actually creates,
 *  stops and deletes node instances.
 */
pub mod platform;
pub mod random;
/**
 * Staged scale-up and scale-down of a live cluster.
 */
pub mod stage;
pub mod testkit;

mod tasks;

pub mod prelude {
    pub use crate::api::{ApiError, HttpClientFactory, NodeApi};
    pub use crate::check::{CheckError, CheckKind, CheckReport, CheckRunner};
    pub use crate::cluster::{
        setup_cluster, Cluster, ClusterError, ClusterOptions, NodeGroup, StartMode,
    };
    pub use crate::config::Config;
    pub use crate::content::{Chunk, SwarmAddress};
    pub use crate::stage::{Stage, StageExecutor};
}
