/// In-process stand-ins for a live deployment
///
/// [`MemoryNetwork`] plays both the provisioning platform and the node
/// API: nodes it creates answer health, upload, download, pinning and
/// pingpong calls against a shared content store. Faults can be injected
/// per node. [`MemorySink`] records metric pushes.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::MemoryNetwork;
///
/// #[tokio::test]
/// async fn test_retrieval() -> anyhow::Result<()> {
///     let net = MemoryNetwork::new();
///     let cluster = net.start_cluster(CONFIG).await?;
///
///     // the last node returns garbage on its second download
///     net.corrupt_download("drone-2", 2);
///     Ok(())
/// }
/// ```
mod network;
mod sink;

pub use network::{MemoryNetwork, PlatformEvent};
pub use sink::MemorySink;
