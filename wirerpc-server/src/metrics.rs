//! Prometheus metrics for the wirerpc server.
//!
//! Metrics are served by the RPC listener itself at the configured path.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::ops::RangeInclusive;

/// Request duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Content type of the Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metrics for the wirerpc server.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// Currently active connections.
    pub connections_active: Gauge,
    /// Total RPC requests by grammar.
    pub requests_total: CounterVec,
    /// Total fault responses by fault code.
    pub faults_total: CounterVec,
    /// Request duration histogram by grammar.
    pub request_duration: HistogramVec,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total = Counter::with_opts(Opts::new(
            "wirerpc_connections_total",
            "Total number of connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connections_active = Gauge::with_opts(Opts::new(
            "wirerpc_connections_active",
            "Number of currently active connections",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        let requests_total = CounterVec::new(
            Opts::new("wirerpc_requests_total", "Total RPC requests by grammar"),
            &["grammar"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let faults_total = CounterVec::new(
            Opts::new("wirerpc_faults_total", "Total fault responses by fault code"),
            &["code"],
        )?;
        registry.register(Box::new(faults_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "wirerpc_request_duration_seconds",
                "Request duration in seconds by grammar",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["grammar"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            requests_total,
            faults_total,
            request_duration,
        })
    }

    /// Records a fault response. Codes outside the reserved protocol range
    /// share the `application` label.
    pub fn record_fault(&self, code: i64) {
        let label = fault_label(code);
        self.faults_total.with_label_values(&[label.as_str()]).inc();
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Fault codes reserved for protocol-level faults.
const RESERVED_FAULT_CODES: RangeInclusive<i64> = -32768..=-32000;

fn fault_label(code: i64) -> String {
    if RESERVED_FAULT_CODES.contains(&code) {
        code.to_string()
    } else {
        "application".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.connections_total.inc();
        metrics.connections_active.inc();
        metrics.requests_total.with_label_values(&["xml-rpc"]).inc();
        metrics.record_fault(-32601);
        metrics
            .request_duration
            .with_label_values(&["xml-rpc"])
            .observe(0.001);

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("wirerpc_connections_total"));
        assert!(encoded.contains("wirerpc_connections_active"));
        assert!(encoded.contains("wirerpc_requests_total{grammar=\"xml-rpc\"} 1"));
        assert!(encoded.contains("wirerpc_faults_total{code=\"-32601\"} 1"));
        assert!(encoded.contains("wirerpc_request_duration_seconds"));
    }

    #[test]
    fn test_fault_labels_are_bounded() {
        let metrics = Metrics::new().unwrap();
        metrics.record_fault(-32700);
        metrics.record_fault(-32500);
        for code in [4, 17, -1, i64::MAX, -40000] {
            metrics.record_fault(code);
        }

        let encoded = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(encoded.contains("wirerpc_faults_total{code=\"-32700\"} 1"));
        assert!(encoded.contains("wirerpc_faults_total{code=\"-32500\"} 1"));
        assert!(encoded.contains("wirerpc_faults_total{code=\"application\"} 5"));
        assert!(!encoded.contains("code=\"17\""));
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.requests_total.with_label_values(&["wddx"]).inc();
        let encoded = String::from_utf8(b.encode().unwrap()).unwrap();
        assert!(!encoded.contains("wddx"));
    }
}
