//! Prometheus metrics.
//!
//! Every `record_*` call increments lock-free Prometheus counters and a matching local
//! atomic, so [`MetricsCollector::summary`] works even when the global recorder could
//! not be installed (a second collector in the same process, tests).

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::Duration,
};

use crate::{types::RoutingDecision, upstream::UpstreamError};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "using fallback Prometheus recorder, metrics may not be globally visible"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Snapshot of the local counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub local_requests: u64,
    pub delegated_requests: u64,
    pub failed_requests: u64,
    pub snapshots_created: u64,
    pub snapshot_failures: u64,
    pub upstream_errors: u64,
}

#[derive(Default)]
struct Counters {
    local_requests: AtomicU64,
    delegated_requests: AtomicU64,
    failed_requests: AtomicU64,
    snapshots_created: AtomicU64,
    snapshot_failures: AtomicU64,
    upstream_errors: AtomicU64,
}

pub struct MetricsCollector {
    counters: Counters,
    prometheus_handle: PrometheusHandle,
}

impl fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCollector").field("summary", &self.summary()).finish()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { counters: Counters::default(), prometheus_handle: init_prometheus_recorder() }
    }

    /// Records one dispatched request.
    pub fn record_request(&self, decision: RoutingDecision, success: bool, latency: Duration) {
        let decision_label = decision.as_str();

        counter!("ctxproxy_requests_total", "decision" => decision_label).increment(1);
        histogram!("ctxproxy_request_duration_seconds", "decision" => decision_label)
            .record(latency.as_secs_f64());

        match decision {
            RoutingDecision::Local => &self.counters.local_requests,
            RoutingDecision::Delegated => &self.counters.delegated_requests,
        }
        .fetch_add(1, Ordering::Relaxed);

        if !success {
            counter!("ctxproxy_requests_error_total", "decision" => decision_label).increment(1);
            self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_snapshot_created(&self) {
        counter!("ctxproxy_snapshots_created_total").increment(1);
        self.counters.snapshots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failed(&self) {
        counter!("ctxproxy_snapshot_failures_total").increment(1);
        self.counters.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self, error: &UpstreamError) {
        counter!("ctxproxy_upstream_errors_total", "kind" => error.kind().as_str()).increment(1);
        self.counters.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            local_requests: self.counters.local_requests.load(Ordering::Relaxed),
            delegated_requests: self.counters.delegated_requests.load(Ordering::Relaxed),
            failed_requests: self.counters.failed_requests.load(Ordering::Relaxed),
            snapshots_created: self.counters.snapshots_created.load(Ordering::Relaxed),
            snapshot_failures: self.counters.snapshot_failures.load(Ordering::Relaxed),
            upstream_errors: self.counters.upstream_errors.load(Ordering::Relaxed),
        }
    }

    /// Renders all metrics in the Prometheus text format.
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}
