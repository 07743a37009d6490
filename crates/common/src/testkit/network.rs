use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::api::{
    ApiError, ClientFactory, ConnectionOptions, NodeApi, NodeEndpoints, PinState, UploadOptions,
};
use crate::cluster::{setup_cluster, Cluster, ClusterOptions, NodeGroupOptions, StartMode};
use crate::config::{BeeConfig, Config, NodeGroupProfile};
use crate::content::{address_of, keccak256, SwarmAddress};
use crate::platform::{InstanceHandle, NodeSpec, Platform, PlatformError};

/// A platform call, as observed by the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Create(String),
    Stop(String),
    Delete(String),
}

/// Simulated storage network
///
/// Clones share the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    store_capacity: Option<usize>,
    nodes: BTreeMap<String, SimNode>,
    chunks: HashMap<SwarmAddress, Bytes>,
    files: HashMap<SwarmAddress, Bytes>,
    faults: Faults,
    created: HashMap<String, usize>,
    events: Vec<PlatformEvent>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_create: HashSet<String>,
    never_ready: HashSet<String>,
    ignore_pins: HashSet<String>,
    /// node -> 1-based download that returns corrupted bytes
    corrupt_download: HashMap<String, usize>,
    slow_api: HashMap<String, Duration>,
}

#[derive(Debug, Default)]
struct SimNode {
    up: bool,
    spec: Option<NodeSpec>,
    store: LocalStore,
    uploads: Vec<Bytes>,
    downloads: usize,
}

/// Bounded local store; unpinned chunks are evicted oldest first
#[derive(Debug, Default)]
struct LocalStore {
    order: VecDeque<SwarmAddress>,
    pins: HashMap<SwarmAddress, u64>,
}

impl LocalStore {
    fn contains(&self, address: &SwarmAddress) -> bool {
        self.order.contains(address)
    }

    fn put(&mut self, address: SwarmAddress, capacity: Option<usize>, ignore_pins: bool) {
        if !self.contains(&address) {
            self.order.push_back(address);
        }
        let Some(capacity) = capacity else {
            return;
        };
        while self.order.len() > capacity {
            let victim = self
                .order
                .iter()
                .position(|a| ignore_pins || !self.pins.contains_key(a));
            let Some(victim) = victim else {
                break;
            };
            if let Some(address) = self.order.remove(victim) {
                if ignore_pins {
                    self.pins.remove(&address);
                }
            }
        }
    }

    fn pin(&mut self, address: SwarmAddress) {
        *self.pins.entry(address).or_insert(0) += 1;
    }
}

fn xor_distance(a: &SwarmAddress, b: &SwarmAddress) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a.as_bytes()[i] ^ b.as_bytes()[i];
    }
    out
}

impl State {
    fn up_node(&mut self, name: &str) -> Result<&mut SimNode, ApiError> {
        match self.nodes.get_mut(name) {
            Some(node) if node.up => Ok(node),
            _ => Err(ApiError::ServiceUnavailable),
        }
    }

    fn store_chunk(&mut self, name: &str, address: SwarmAddress) {
        let capacity = self.store_capacity;
        let ignore = self.faults.ignore_pins.contains(name);
        if let Some(node) = self.nodes.get_mut(name) {
            node.store.put(address, capacity, ignore);
        }
    }

    /// Up node whose overlay is closest to `address`
    fn closest(&self, address: &SwarmAddress) -> Option<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.up)
            .min_by_key(|(name, _)| xor_distance(&MemoryNetwork::overlay_of(name), address))
            .map(|(name, _)| name.clone())
    }

    /// Count a download and apply any corruption fault
    fn download(&mut self, name: &str, data: Bytes) -> Result<Bytes, ApiError> {
        let node = self.up_node(name)?;
        node.downloads += 1;
        let nth = node.downloads;
        if self.faults.corrupt_download.get(name) == Some(&nth) {
            tracing::debug!(node = %name, nth, "corrupting download");
            let mut corrupted = data.to_vec();
            match corrupted.last_mut() {
                Some(byte) => *byte ^= 0xff,
                None => corrupted.push(0),
            }
            return Ok(Bytes::from(corrupted));
        }
        Ok(data)
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network whose nodes hold at most `capacity` chunks each
    pub fn with_store_capacity(capacity: usize) -> Self {
        let net = Self::default();
        net.state.lock().store_capacity = Some(capacity);
        net
    }

    /// Overlay address a node named `name` reports
    pub fn overlay_of(name: &str) -> SwarmAddress {
        SwarmAddress::new(keccak256(name.as_bytes()))
    }

    pub fn group_options(&self, namespace: &str) -> NodeGroupOptions {
        NodeGroupOptions {
            namespace: namespace.to_string(),
            disable_namespace: false,
            api: ConnectionOptions::default(),
            debug_api: ConnectionOptions::default(),
            profile: NodeGroupProfile::default(),
            bee_config: BeeConfig::default(),
            platform: Some(Arc::new(self.clone())),
            clients: Arc::new(self.clone()),
        }
    }

    pub fn cluster_options(&self, namespace: &str) -> ClusterOptions {
        ClusterOptions {
            namespace: namespace.to_string(),
            disable_namespace: false,
            api: ConnectionOptions::default(),
            debug_api: ConnectionOptions::default(),
            platform: Some(Arc::new(self.clone())),
            clients: Arc::new(self.clone()),
        }
    }

    /// Parse `config` and start the cluster it describes on this network
    pub async fn start_cluster(&self, config: &str) -> anyhow::Result<Cluster> {
        let config = Config::parse(config)?;
        let options = self.cluster_options(&config.cluster.namespace);
        let cluster = setup_cluster(&config, options, StartMode::Start).await?;
        Ok(cluster)
    }

    /// Bring a node up as if started outside the platform
    pub fn boot(&self, name: &str) {
        let mut state = self.state.lock();
        state.nodes.entry(name.to_string()).or_default().up = true;
    }

    /// Delay every API call made to `name`
    pub fn slow_api(&self, name: &str, delay: Duration) {
        self.state
            .lock()
            .faults
            .slow_api
            .insert(name.to_string(), delay);
    }

    pub fn fail_create(&self, name: &str) {
        self.state.lock().faults.fail_create.insert(name.to_string());
    }

    /// Creation succeeds but the node never reports healthy
    pub fn never_ready(&self, name: &str) {
        self.state.lock().faults.never_ready.insert(name.to_string());
    }

    /// Let eviction on `name` drop pinned chunks too
    pub fn ignore_pins(&self, name: &str) {
        self.state.lock().faults.ignore_pins.insert(name.to_string());
    }

    /// Corrupt the `nth` download (1-based) served by `name`
    pub fn corrupt_download(&self, name: &str, nth: usize) {
        self.state
            .lock()
            .faults
            .corrupt_download
            .insert(name.to_string(), nth);
    }

    /// Times `name` was created, restarts included
    pub fn created(&self, name: &str) -> usize {
        self.state.lock().created.get(name).copied().unwrap_or(0)
    }

    pub fn is_up(&self, name: &str) -> bool {
        self.state.lock().nodes.get(name).is_some_and(|n| n.up)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().nodes.contains_key(name)
    }

    /// Spec of the latest create for `name`
    pub fn spec_of(&self, name: &str) -> Option<NodeSpec> {
        self.state
            .lock()
            .nodes
            .get(name)
            .and_then(|n| n.spec.clone())
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.state.lock().events.clone()
    }

    /// Names in the order they were created
    pub fn creation_order(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PlatformEvent::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Data uploaded through `name`, oldest first
    pub fn uploads(&self, name: &str) -> Vec<Bytes> {
        self.state
            .lock()
            .nodes
            .get(name)
            .map(|n| n.uploads.clone())
            .unwrap_or_default()
    }

    pub fn downloads(&self, name: &str) -> usize {
        self.state
            .lock()
            .nodes
            .get(name)
            .map_or(0, |n| n.downloads)
    }

    pub fn has_local(&self, name: &str, address: &SwarmAddress) -> bool {
        self.state
            .lock()
            .nodes
            .get(name)
            .is_some_and(|n| n.store.contains(address))
    }
}

#[async_trait]
impl Platform for MemoryNetwork {
    async fn create(&self, spec: &NodeSpec) -> Result<InstanceHandle, PlatformError> {
        let mut state = self.state.lock();
        if state.faults.fail_create.contains(&spec.name) {
            return Err(PlatformError::Other(format!(
                "injected create failure for {}",
                spec.name
            )));
        }
        let node = state.nodes.entry(spec.name.clone()).or_default();
        node.up = true;
        node.spec = Some(spec.clone());
        *state.created.entry(spec.name.clone()).or_insert(0) += 1;
        state.events.push(PlatformEvent::Create(spec.name.clone()));
        Ok(InstanceHandle {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
        })
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&handle.name)
            .ok_or_else(|| PlatformError::NotFound(handle.to_string()))?;
        node.up = false;
        state.events.push(PlatformEvent::Stop(handle.name.clone()));
        Ok(())
    }

    async fn delete(&self, handle: &InstanceHandle) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state
            .nodes
            .remove(&handle.name)
            .ok_or_else(|| PlatformError::NotFound(handle.to_string()))?;
        state.events.push(PlatformEvent::Delete(handle.name.clone()));
        Ok(())
    }

    async fn is_running(&self, handle: &InstanceHandle) -> bool {
        self.is_up(&handle.name)
    }
}

impl ClientFactory for MemoryNetwork {
    fn connect(&self, endpoints: &NodeEndpoints) -> Result<Arc<dyn NodeApi>, ApiError> {
        Ok(Arc::new(MemoryClient {
            name: endpoints.name.clone(),
            net: self.clone(),
        }))
    }
}

/// API handle bound to one simulated node
#[derive(Debug)]
struct MemoryClient {
    name: String,
    net: MemoryNetwork,
}

impl MemoryClient {
    async fn stall(&self) {
        let delay = self.net.state.lock().faults.slow_api.get(&self.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NodeApi for MemoryClient {
    async fn health(&self) -> Result<(), ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?;
        if state.faults.never_ready.contains(&self.name) {
            return Err(ApiError::ServiceUnavailable);
        }
        Ok(())
    }

    async fn overlay(&self) -> Result<SwarmAddress, ApiError> {
        self.stall().await;
        self.net.state.lock().up_node(&self.name)?;
        Ok(MemoryNetwork::overlay_of(&self.name))
    }

    async fn peers(&self) -> Result<Vec<SwarmAddress>, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?;
        Ok(state
            .nodes
            .iter()
            .filter(|(name, node)| node.up && **name != self.name)
            .map(|(name, _)| MemoryNetwork::overlay_of(name))
            .collect())
    }

    async fn upload_chunk(
        &self,
        data: &Bytes,
        opts: UploadOptions,
    ) -> Result<SwarmAddress, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?.uploads.push(data.clone());
        let address = address_of(data);
        if address == SwarmAddress::ZERO {
            return Err(ApiError::BadRequest(vec!["chunk too short".to_string()]));
        }
        state.chunks.insert(address, data.clone());

        state.store_chunk(&self.name, address);
        if let Some(closest) = state.closest(&address) {
            state.store_chunk(&closest, address);
        }
        if opts.pin {
            if let Some(node) = state.nodes.get_mut(&self.name) {
                node.store.pin(address);
            }
        }
        Ok(address)
    }

    async fn download_chunk(&self, address: &SwarmAddress) -> Result<Bytes, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?;
        let data = state.chunks.get(address).cloned().ok_or(ApiError::NotFound)?;
        state.download(&self.name, data)
    }

    async fn upload_file(
        &self,
        _name: &str,
        data: &Bytes,
        _opts: UploadOptions,
    ) -> Result<SwarmAddress, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?.uploads.push(data.clone());
        let address = SwarmAddress::new(keccak256(data));
        state.files.insert(address, data.clone());
        Ok(address)
    }

    async fn download_file(&self, address: &SwarmAddress) -> Result<Bytes, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?;
        let data = state.files.get(address).cloned().ok_or(ApiError::NotFound)?;
        state.download(&self.name, data)
    }

    async fn pin_chunk(&self, address: &SwarmAddress) -> Result<(), ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?;
        if !state.chunks.contains_key(address) {
            return Err(ApiError::NotFound);
        }
        if let Some(node) = state.nodes.get_mut(&self.name) {
            node.store.pin(*address);
        }
        state.store_chunk(&self.name, *address);
        Ok(())
    }

    async fn pin_status(&self, address: &SwarmAddress) -> Result<PinState, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        let node = state.up_node(&self.name)?;
        let counter = node.store.pins.get(address).copied().unwrap_or(0);
        Ok(PinState {
            pinned: counter > 0,
            counter,
        })
    }

    async fn has_chunk(&self, address: &SwarmAddress) -> Result<bool, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        Ok(state.up_node(&self.name)?.store.contains(address))
    }

    async fn ping(&self, peer: &SwarmAddress) -> Result<Duration, ApiError> {
        self.stall().await;
        let mut state = self.net.state.lock();
        state.up_node(&self.name)?;
        let reachable = state
            .nodes
            .iter()
            .any(|(name, node)| node.up && MemoryNetwork::overlay_of(name) == *peer);
        if !reachable {
            return Err(ApiError::NotFound);
        }
        let from = MemoryNetwork::overlay_of(&self.name);
        let jitter = xor_distance(&from, peer)[0] as u64;
        Ok(Duration::from_micros(500 + jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Chunk;
    use crate::random::pseudo_generator;

    #[test]
    fn test_eviction_keeps_pinned_chunks() {
        let mut store = LocalStore::default();
        let a = SwarmAddress::new([1; 32]);
        let b = SwarmAddress::new([2; 32]);
        let c = SwarmAddress::new([3; 32]);

        store.put(a, Some(2), false);
        store.pin(a);
        store.put(b, Some(2), false);
        store.put(c, Some(2), false);
        assert!(store.contains(&a));
        assert!(!store.contains(&b));
        assert!(store.contains(&c));
    }

    #[test]
    fn test_eviction_ignoring_pins() {
        let mut store = LocalStore::default();
        let a = SwarmAddress::new([1; 32]);
        let b = SwarmAddress::new([2; 32]);

        store.put(a, Some(1), true);
        store.pin(a);
        store.put(b, Some(1), true);
        assert!(!store.contains(&a));
        assert!(!store.pins.contains_key(&a));
    }

    #[tokio::test]
    async fn test_stopped_node_is_unavailable() {
        let net = MemoryNetwork::new();
        net.boot("bee-0");
        let ep = NodeEndpoints::resolve(
            "bee-0",
            "test",
            false,
            &ConnectionOptions::default(),
            &ConnectionOptions::default(),
        )
        .unwrap();
        let client = net.connect(&ep).unwrap();
        client.health().await.unwrap();

        let chunk = Chunk::random(&mut pseudo_generator(1));
        let address = client
            .upload_chunk(chunk.data(), UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(address, chunk.address());
        assert_eq!(client.download_chunk(&address).await.unwrap(), *chunk.data());

        net.state.lock().nodes.get_mut("bee-0").unwrap().up = false;
        assert!(matches!(
            client.health().await,
            Err(ApiError::ServiceUnavailable)
        ));
    }
}
