//! Metric collectors and sinks
//!
//! Collectors are plain owned values. Each check run builds its own set,
//! registers it with the configured [`MetricsSink`] once, and pushes after
//! every unit of work. Encoding follows the Prometheus text format.

mod push;

use std::collections::BTreeMap;
use std::fmt::{Debug, Write};
use std::time::Duration;

use parking_lot::RwLock;

pub use push::{MetricsError, MetricsSink, PushGateway};

/// Default latency buckets, in seconds
pub const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Something that can render itself in the text exposition format
pub trait Collector: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn encode(&self, out: &mut String);
}

/// Full metric name under `namespace`
pub fn metric_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

fn format_labels(names: &[&'static str], values: &[String], extra: Option<(&str, &str)>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape(v)))
        .collect();
    if let Some((k, v)) = extra {
        pairs.push(format!("{}=\"{}\"", k, v));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn label_key(names: &[&'static str], values: &[&str]) -> Vec<String> {
    debug_assert_eq!(names.len(), values.len(), "label cardinality mismatch");
    values.iter().map(|v| v.to_string()).collect()
}

/// Monotonic counter partitioned by labels
#[derive(Debug)]
pub struct CounterVec {
    name: String,
    help: String,
    labels: Vec<&'static str>,
    values: RwLock<BTreeMap<Vec<String>, u64>>,
}

impl CounterVec {
    pub fn new(name: impl Into<String>, help: impl Into<String>, labels: &[&'static str]) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: labels.to_vec(),
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn inc(&self, labels: &[&str]) {
        self.inc_by(labels, 1);
    }

    pub fn inc_by(&self, labels: &[&str], n: u64) {
        let key = label_key(&self.labels, labels);
        *self.values.write().entry(key).or_insert(0) += n;
    }

    pub fn get(&self, labels: &[&str]) -> u64 {
        let key = label_key(&self.labels, labels);
        self.values.read().get(&key).copied().unwrap_or(0)
    }
}

impl Collector for CounterVec {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, out: &mut String) {
        write_header(out, &self.name, &self.help, "counter");
        for (values, count) in self.values.read().iter() {
            let labels = format_labels(&self.labels, values, None);
            let _ = writeln!(out, "{}{} {}", self.name, labels, count);
        }
    }
}

/// Point-in-time value partitioned by labels
#[derive(Debug)]
pub struct GaugeVec {
    name: String,
    help: String,
    labels: Vec<&'static str>,
    values: RwLock<BTreeMap<Vec<String>, f64>>,
}

impl GaugeVec {
    pub fn new(name: impl Into<String>, help: impl Into<String>, labels: &[&'static str]) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: labels.to_vec(),
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn set(&self, labels: &[&str], value: f64) {
        let key = label_key(&self.labels, labels);
        self.values.write().insert(key, value);
    }

    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        let key = label_key(&self.labels, labels);
        self.values.read().get(&key).copied()
    }
}

impl Collector for GaugeVec {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, out: &mut String) {
        write_header(out, &self.name, &self.help, "gauge");
        for (values, value) in self.values.read().iter() {
            let labels = format_labels(&self.labels, values, None);
            let _ = writeln!(out, "{}{} {}", self.name, labels, value);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Buckets {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

/// Latency distribution in seconds, partitioned by labels
#[derive(Debug)]
pub struct HistogramVec {
    name: String,
    help: String,
    labels: Vec<&'static str>,
    bounds: Vec<f64>,
    values: RwLock<BTreeMap<Vec<String>, Buckets>>,
}

impl HistogramVec {
    pub fn new(name: impl Into<String>, help: impl Into<String>, labels: &[&'static str]) -> Self {
        Self::with_buckets(name, help, labels, &LATENCY_BUCKETS)
    }

    pub fn with_buckets(
        name: impl Into<String>,
        help: impl Into<String>,
        labels: &[&'static str],
        bounds: &[f64],
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: labels.to_vec(),
            bounds: bounds.to_vec(),
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn observe(&self, labels: &[&str], value: f64) {
        let key = label_key(&self.labels, labels);
        let mut values = self.values.write();
        let buckets = values.entry(key).or_insert_with(|| Buckets {
            counts: vec![0; self.bounds.len()],
            ..Default::default()
        });
        if let Some(idx) = self.bounds.iter().position(|bound| value <= *bound) {
            buckets.counts[idx] += 1;
        }
        buckets.sum += value;
        buckets.count += 1;
    }

    pub fn observe_duration(&self, labels: &[&str], duration: Duration) {
        self.observe(labels, duration.as_secs_f64());
    }

    /// Number of observations recorded under `labels`
    pub fn count(&self, labels: &[&str]) -> u64 {
        let key = label_key(&self.labels, labels);
        self.values.read().get(&key).map_or(0, |b| b.count)
    }
}

impl Collector for HistogramVec {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, out: &mut String) {
        write_header(out, &self.name, &self.help, "histogram");
        for (values, buckets) in self.values.read().iter() {
            let mut cumulative = 0;
            for (bound, count) in self.bounds.iter().zip(&buckets.counts) {
                cumulative += count;
                let le = bound.to_string();
                let labels = format_labels(&self.labels, values, Some(("le", &le)));
                let _ = writeln!(out, "{}_bucket{} {}", self.name, labels, cumulative);
            }
            let labels = format_labels(&self.labels, values, Some(("le", "+Inf")));
            let _ = writeln!(out, "{}_bucket{} {}", self.name, labels, buckets.count);

            let labels = format_labels(&self.labels, values, None);
            let _ = writeln!(out, "{}_sum{} {}", self.name, labels, buckets.sum);
            let _ = writeln!(out, "{}_count{} {}", self.name, labels, buckets.count);
        }
    }
}

/// Render a set of collectors as one exposition document
pub fn encode_all<'a>(collectors: impl IntoIterator<Item = &'a dyn Collector>) -> String {
    let mut out = String::new();
    for collector in collectors {
        collector.encode(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name() {
        assert_eq!(
            metric_name("beekeeper", "check_retrieval", "chunks_uploaded_total"),
            "beekeeper_check_retrieval_chunks_uploaded_total"
        );
        assert_eq!(metric_name("", "check", "runs_total"), "check_runs_total");
    }

    #[test]
    fn test_counter_encoding() {
        let counter = CounterVec::new("uploads_total", "Uploaded chunks", &["node"]);
        counter.inc(&["drone-0"]);
        counter.inc_by(&["drone-1"], 2);
        counter.inc(&["drone-0"]);
        assert_eq!(counter.get(&["drone-0"]), 2);
        assert_eq!(counter.get(&["drone-9"]), 0);

        let mut out = String::new();
        counter.encode(&mut out);
        assert_eq!(
            out,
            "# HELP uploads_total Uploaded chunks\n\
             # TYPE uploads_total counter\n\
             uploads_total{node=\"drone-0\"} 2\n\
             uploads_total{node=\"drone-1\"} 2\n"
        );
    }

    #[test]
    fn test_gauge_overwrites() {
        let gauge = GaugeVec::new("duration_seconds", "Run duration", &[]);
        gauge.set(&[], 1.5);
        gauge.set(&[], 2.0);
        assert_eq!(gauge.get(&[]), Some(2.0));

        let mut out = String::new();
        gauge.encode(&mut out);
        assert!(out.ends_with("duration_seconds 2\n"));
    }

    #[test]
    fn test_histogram_is_cumulative() {
        let histogram =
            HistogramVec::with_buckets("latency_seconds", "Latency", &["node"], &[0.1, 1.0]);
        histogram.observe(&["a"], 0.05);
        histogram.observe(&["a"], 0.5);
        histogram.observe(&["a"], 3.0);
        assert_eq!(histogram.count(&["a"]), 3);

        let mut out = String::new();
        histogram.encode(&mut out);
        assert!(out.contains("latency_seconds_bucket{node=\"a\",le=\"0.1\"} 1\n"));
        assert!(out.contains("latency_seconds_bucket{node=\"a\",le=\"1\"} 2\n"));
        assert!(out.contains("latency_seconds_bucket{node=\"a\",le=\"+Inf\"} 3\n"));
        assert!(out.contains("latency_seconds_count{node=\"a\"} 3\n"));
    }

    #[test]
    fn test_label_values_are_escaped() {
        let counter = CounterVec::new("errors_total", "Errors", &["reason"]);
        counter.inc(&["say \"hi\""]);
        let mut out = String::new();
        counter.encode(&mut out);
        assert!(out.contains(r#"errors_total{reason="say \"hi\""} 1"#));
    }
}
