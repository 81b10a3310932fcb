//! # Prometheus Metrics — Server Self-Instrumentation
//!
//! The server's own operational metrics in the Prometheus text exposition
//! format, served at `GET /metrics`. Not to be confused with the metrics the
//! server stores on behalf of agents.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `metricsrelay_http_requests_total` | Counter | `method`, `path`, `status` | Requests served |
//! | `metricsrelay_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//! | `metricsrelay_metric_writes_total` | Counter | `metric_type` | Records accepted by the repository |
//! | `metricsrelay_rejected_writes_total` | Counter | `reason` | Writes refused by the repository |
//! | `metricsrelay_stored_metrics` | Gauge | — | Records in storage at last scrape |
//!
//! `path` is the matched route template (`/update/{type}/{name}/{value}`), not
//! the raw URI, to keep label cardinality bounded.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::error::StoreError;
use crate::metric::MetricType;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabel {
    pub method: String,
    pub path: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabel {
    pub method: String,
    pub path: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TypeLabel {
    pub metric_type: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReasonLabel {
    pub reason: String,
}

type LatencyFamily = Family<RouteLabel, Histogram, fn() -> Histogram>;

fn latency_histogram() -> Histogram {
    // 1ms .. ~2s
    Histogram::new(exponential_buckets(0.001, 2.0, 12))
}

pub struct Metrics {
    pub registry: Registry,
    pub http_requests: Family<RequestLabel, Counter>,
    pub http_request_duration: LatencyFamily,
    pub metric_writes: Family<TypeLabel, Counter>,
    pub rejected_writes: Family<ReasonLabel, Counter>,
    pub stored_metrics: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests = Family::<RequestLabel, Counter>::default();
        registry.register(
            "metricsrelay_http_requests",
            "HTTP requests served",
            http_requests.clone(),
        );

        let http_request_duration: LatencyFamily = Family::new_with_constructor(latency_histogram);
        registry.register(
            "metricsrelay_http_request_duration_seconds",
            "HTTP request latency in seconds",
            http_request_duration.clone(),
        );

        let metric_writes = Family::<TypeLabel, Counter>::default();
        registry.register(
            "metricsrelay_metric_writes",
            "Metric records accepted by the repository",
            metric_writes.clone(),
        );

        let rejected_writes = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "metricsrelay_rejected_writes",
            "Metric writes refused by the repository",
            rejected_writes.clone(),
        );

        let stored_metrics = Gauge::default();
        registry.register(
            "metricsrelay_stored_metrics",
            "Metric records held in storage at last scrape",
            stored_metrics.clone(),
        );

        Self {
            registry,
            http_requests,
            http_request_duration,
            metric_writes,
            rejected_writes,
            stored_metrics,
        }
    }

    pub fn record_write(&self, mtype: &MetricType) {
        self.metric_writes
            .get_or_create(&TypeLabel {
                metric_type: mtype.to_string(),
            })
            .inc();
    }

    pub fn record_rejection(&self, err: &StoreError) {
        let reason = match err {
            StoreError::InvalidChecksum { .. } => "checksum",
            StoreError::UnknownMetricType(_) => "unknown_type",
            StoreError::MissingValue { .. } => "missing_value",
            StoreError::NonFiniteValue { .. } => "non_finite",
            StoreError::TypeConflict { .. } => "type_conflict",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Timeout => "timeout",
            StoreError::Io(_) | StoreError::Json(_) | StoreError::Database(_) => "storage",
        };
        self.rejected_writes
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
