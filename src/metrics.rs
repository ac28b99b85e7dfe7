//! Prometheus metrics registry for the gateway
//!
//! Tracks:
//! - Request duration by method, route label and status code
//! - Upstream forwarding failures by route and reason
//! - Process metrics (Linux only)
//!
//! Exposed via `/metrics` in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Histogram buckets for request duration, in seconds
pub const DURATION_BUCKETS: [f64; 9] = [0.1, 0.3, 0.5, 0.7, 1.0, 3.0, 5.0, 7.0, 10.0];

/// Route label for requests no route claimed
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Outcome of a single request, produced once and consumed by [`Metrics`]
#[derive(Debug, Clone)]
pub struct RequestObservation {
    pub method: String,
    pub route: String,
    pub status: u16,
    pub duration: Duration,
}

/// Why a forward to an upstream failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    Timeout,
    Connect,
    Other,
}

impl UpstreamFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamFailure::Timeout => "timeout",
            UpstreamFailure::Connect => "connect",
            UpstreamFailure::Other => "other",
        }
    }
}

/// Metrics collector owned by the gateway process
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    request_duration: HistogramVec,
    upstream_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "route", "code"],
        )?;

        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "gateway_upstream_failures_total",
                "Upstream forwards that ended in a 503, by route and reason",
            ),
            &["route", "reason"],
        )?;

        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            request_duration,
            upstream_failures,
        })
    }

    /// Record a finished request
    pub fn observe(&self, observation: &RequestObservation) {
        let code = observation.status.to_string();
        self.request_duration
            .with_label_values(&[&observation.method, &observation.route, &code])
            .observe(observation.duration.as_secs_f64());
    }

    /// Record a failed upstream forward
    pub fn upstream_failure(&self, route: &str, failure: UpstreamFailure) {
        self.upstream_failures
            .with_label_values(&[route, failure.as_str()])
            .inc();
    }

    /// Number of requests recorded for a label set
    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        self.request_duration
            .get_metric_with_label_values(&[method, route, &status.to_string()])
            .map(|h| h.get_sample_count())
            .unwrap_or(0)
    }

    /// Number of requests recorded across all label sets
    pub fn total_requests(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "http_request_duration_seconds")
            .flat_map(|family| family.get_metric())
            .map(|metric| metric.get_histogram().get_sample_count())
            .sum()
    }

    /// Number of upstream failures recorded for a route and reason
    pub fn upstream_failure_count(&self, route: &str, failure: UpstreamFailure) -> u64 {
        self.upstream_failures
            .get_metric_with_label_values(&[route, failure.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Content type of [`Metrics::gather`] output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Encode all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                error!(error = %e, "Prometheus text encoder failed");
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            error!(error = %e, "Prometheus encoder produced invalid UTF-8");
            prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
        })
    }
}
