use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use url::Url;

use super::Collector;
use crate::api::USER_AGENT;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("collector {0} already registered")]
    AlreadyRegistered(String),
    #[error("invalid push gateway url: {0}")]
    Url(#[from] url::ParseError),
    #[error("push failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push gateway responded {0}")]
    Status(StatusCode),
    #[error("push failed: {0}")]
    Other(String),
}

/// Destination for a run's metrics
#[async_trait]
pub trait MetricsSink: Send + Sync + Debug {
    /// Add a collector; a name is held by one collector at a time
    fn register(&self, collector: Arc<dyn Collector>) -> Result<(), MetricsError>;

    /// Drop the collector registered under `name`, if any
    fn unregister(&self, name: &str);

    /// Publish the current value of every registered collector
    async fn push(&self) -> Result<(), MetricsError>;
}

/// Prometheus push gateway client
///
/// Every push replaces the metrics of the job grouping key
/// (`/metrics/job/<job>`).
#[derive(Debug)]
pub struct PushGateway {
    endpoint: Url,
    client: Client,
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
}

impl PushGateway {
    pub fn new(gateway: &str, job: &str) -> Result<Self, MetricsError> {
        let base = Url::parse(gateway)?;
        let endpoint = base.join(&format!("metrics/job/{}", job))?;
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            endpoint,
            client,
            collectors: RwLock::new(Vec::new()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Current exposition document
    pub fn gather(&self) -> String {
        let collectors = self.collectors.read();
        super::encode_all(collectors.iter().map(|c| c.as_ref()))
    }
}

#[async_trait]
impl MetricsSink for PushGateway {
    fn register(&self, collector: Arc<dyn Collector>) -> Result<(), MetricsError> {
        let mut collectors = self.collectors.write();
        if collectors.iter().any(|c| c.name() == collector.name()) {
            return Err(MetricsError::AlreadyRegistered(collector.name().to_string()));
        }
        collectors.push(collector);
        Ok(())
    }

    fn unregister(&self, name: &str) {
        self.collectors.write().retain(|c| c.name() != name);
    }

    async fn push(&self) -> Result<(), MetricsError> {
        let body = self.gather();
        let response = self
            .client
            .put(self.endpoint.clone())
            .header(CONTENT_TYPE, TEXT_FORMAT)
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MetricsError::Status(response.status()));
        }
        tracing::trace!(endpoint = %self.endpoint, "metrics pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CounterVec;

    #[test]
    fn test_endpoint_and_duplicate_registration() {
        let gateway = PushGateway::new("http://pushgateway.local:9091/", "swarm").unwrap();
        assert_eq!(
            gateway.endpoint().as_str(),
            "http://pushgateway.local:9091/metrics/job/swarm"
        );

        let counter = Arc::new(CounterVec::new("runs_total", "Runs", &[]));
        gateway.register(counter.clone()).unwrap();
        assert!(matches!(
            gateway.register(counter.clone()),
            Err(MetricsError::AlreadyRegistered(_))
        ));

        counter.inc(&[]);
        assert!(gateway.gather().contains("runs_total 1"));

        gateway.unregister("runs_total");
        assert!(!gateway.gather().contains("runs_total"));
        gateway
            .register(Arc::new(CounterVec::new("runs_total", "Runs", &[])))
            .unwrap();
    }
}
