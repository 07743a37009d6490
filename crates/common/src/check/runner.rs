use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{CheckError, CheckKind, RunContext, METRICS_NAMESPACE};
use crate::cluster::Cluster;
use crate::deadline::Interrupted;
use crate::metrics::{metric_name, Collector, CounterVec, GaugeVec, MetricsSink};
use crate::random::random_seed;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub check: &'static str,
    pub seed: i64,
    pub duration: Duration,
}

#[derive(Debug)]
struct RunnerMetrics {
    duration: Arc<GaugeVec>,
    runs: Arc<CounterVec>,
}

impl RunnerMetrics {
    fn new() -> Self {
        Self {
            duration: Arc::new(GaugeVec::new(
                metric_name(METRICS_NAMESPACE, "", "check_duration_seconds"),
                "Duration of the last check run.",
                &["check"],
            )),
            runs: Arc::new(CounterVec::new(
                metric_name(METRICS_NAMESPACE, "", "check_runs_total"),
                "Number of check runs by outcome.",
                &["check", "outcome"],
            )),
        }
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![
            self.duration.clone() as Arc<dyn Collector>,
            self.runs.clone() as Arc<dyn Collector>,
        ]
    }
}

/// Runs checks against a cluster
#[derive(Debug, Clone)]
pub struct CheckRunner {
    cluster: Cluster,
    seed: Option<i64>,
    timeout: Option<Duration>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl CheckRunner {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            seed: None,
            timeout: None,
            metrics: None,
        }
    }

    /// Fix the seed; a random one is drawn per run otherwise
    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<dyn MetricsSink>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub async fn run(&self, check: &CheckKind) -> Result<CheckReport, CheckError> {
        let name = check.name();
        let seed = self.seed.unwrap_or_else(random_seed);
        tracing::info!(check = name, seed, "running check");

        let ctx = RunContext::new(seed, self.metrics.clone());
        let metrics = RunnerMetrics::new();
        ctx.register(metrics.collectors());

        let start = Instant::now();
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, check.run(&self.cluster, &ctx))
                .await
                .unwrap_or_else(|_| Err(Interrupted::Timeout(timeout).into())),
            None => check.run(&self.cluster, &ctx).await,
        };
        let duration = start.elapsed();

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics.duration.set(&[name], duration.as_secs_f64());
        metrics.runs.inc(&[name, outcome]);
        ctx.push().await;
        ctx.finish();

        match result {
            Ok(()) => {
                tracing::info!(check = name, seed, ?duration, "check passed");
                Ok(CheckReport {
                    check: name,
                    seed,
                    duration,
                })
            }
            Err(e) => {
                tracing::error!(check = name, seed, ?duration, "check failed: {}", e);
                Err(e)
            }
        }
    }
}
