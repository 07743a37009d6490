//! Node control API
//!
//! Every node exposes two HTTP surfaces: the public API (uploads, downloads,
//! pinning) and the debug API (addresses, peers, pingpong, local store
//! probes). [`NodeApi`] is the seam the cluster and the checks talk through;
//! [`HttpNodeClient`] is the production implementation.

mod client;
mod error;
mod rtt;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::SwarmAddress;

pub use client::{HttpClientFactory, HttpNodeClient};
pub use error::ApiError;
pub use rtt::parse_go_duration;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("swarmkeeper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Ask the node to pin the content locally on upload
    pub pin: bool,
}

/// Pinning state of a single chunk on a single node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub pinned: bool,
    pub counter: u64,
}

#[async_trait]
pub trait NodeApi: Send + Sync + Debug {
    /// Succeeds once the node reports itself healthy
    async fn health(&self) -> Result<(), ApiError>;

    async fn overlay(&self) -> Result<SwarmAddress, ApiError>;

    async fn peers(&self) -> Result<Vec<SwarmAddress>, ApiError>;

    /// Upload span prefixed chunk data, returning the chunk address
    async fn upload_chunk(&self, data: &Bytes, opts: UploadOptions)
        -> Result<SwarmAddress, ApiError>;

    async fn download_chunk(&self, address: &SwarmAddress) -> Result<Bytes, ApiError>;

    async fn upload_file(
        &self,
        name: &str,
        data: &Bytes,
        opts: UploadOptions,
    ) -> Result<SwarmAddress, ApiError>;

    async fn download_file(&self, address: &SwarmAddress) -> Result<Bytes, ApiError>;

    /// Pin a chunk, retrieving it from the network if it is not held locally
    async fn pin_chunk(&self, address: &SwarmAddress) -> Result<(), ApiError>;

    async fn pin_status(&self, address: &SwarmAddress) -> Result<PinState, ApiError>;

    /// Whether the chunk is present in the node's local store
    async fn has_chunk(&self, address: &SwarmAddress) -> Result<bool, ApiError>;

    /// Round trip time of a pingpong exchange with `peer`
    async fn ping(&self, peer: &SwarmAddress) -> Result<Duration, ApiError>;
}

/// Connection settings for one of the two API surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConnectionOptions {
    pub scheme: String,
    pub domain: String,
    pub insecure_tls: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            domain: "localhost".to_string(),
            insecure_tls: false,
        }
    }
}

/// Resolved network endpoints of a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoints {
    pub name: String,
    pub api: Url,
    pub api_insecure_tls: bool,
    pub debug_api: Url,
    pub debug_api_insecure_tls: bool,
}

impl NodeEndpoints {
    /// Resolve `<scheme>://<name>[.<namespace>].<domain>` for the API and
    /// `<scheme>://<name>-debug[.<namespace>].<domain>` for the debug API
    pub fn resolve(
        name: &str,
        namespace: &str,
        disable_namespace: bool,
        api: &ConnectionOptions,
        debug_api: &ConnectionOptions,
    ) -> Result<Self, ApiError> {
        let host = |label: String, opts: &ConnectionOptions| {
            if disable_namespace || namespace.is_empty() {
                format!("{}://{}.{}", opts.scheme, label, opts.domain)
            } else {
                format!("{}://{}.{}.{}", opts.scheme, label, namespace, opts.domain)
            }
        };

        Ok(Self {
            name: name.to_string(),
            api: Url::parse(&host(name.to_string(), api))?,
            api_insecure_tls: api.insecure_tls,
            debug_api: Url::parse(&host(format!("{}-debug", name), debug_api))?,
            debug_api_insecure_tls: debug_api.insecure_tls,
        })
    }
}

/// Builds the API handle a node uses once its endpoints are known
pub trait ClientFactory: Send + Sync + Debug {
    fn connect(&self, endpoints: &NodeEndpoints) -> Result<Arc<dyn NodeApi>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_namespace() {
        let api = ConnectionOptions {
            scheme: "https".into(),
            domain: "staging.internal".into(),
            insecure_tls: true,
        };
        let debug = ConnectionOptions::default();
        let ep = NodeEndpoints::resolve("bee-0", "swarm", false, &api, &debug).unwrap();
        assert_eq!(ep.api.as_str(), "https://bee-0.swarm.staging.internal/");
        assert_eq!(ep.debug_api.as_str(), "http://bee-0-debug.swarm.localhost/");
        assert!(ep.api_insecure_tls);
        assert!(!ep.debug_api_insecure_tls);
    }

    #[test]
    fn test_resolve_without_namespace() {
        let opts = ConnectionOptions::default();
        let ep = NodeEndpoints::resolve("drone-2", "swarm", true, &opts, &opts).unwrap();
        assert_eq!(ep.api.as_str(), "http://drone-2.localhost/");
        assert_eq!(ep.debug_api.as_str(), "http://drone-2-debug.localhost/");
    }
}
