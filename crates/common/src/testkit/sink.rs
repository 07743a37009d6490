use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::metrics::{encode_all, Collector, MetricsError, MetricsSink};

/// Metrics sink that keeps every pushed document in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
    pushes: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following push fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Documents of every successful push, oldest first
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().clone()
    }

    /// Pushes attempted, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_push(&self) -> Option<String> {
        self.pushes.lock().last().cloned()
    }

    pub fn registered(&self) -> Vec<String> {
        self.collectors
            .read()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Current exposition document, pushed or not
    pub fn gather(&self) -> String {
        let collectors = self.collectors.read();
        encode_all(collectors.iter().map(|c| c.as_ref()))
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
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
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetricsError::Other("injected push failure".to_string()));
        }
        let document = self.gather();
        self.pushes.lock().push(document);
        Ok(())
    }
}
