//! Test Helper Functions and Utilities
//!
//! Dispatcher wiring, facility line capture and node fixtures.

use std::{sync::Arc, time::Duration};

use ctxproxy_core::{
    cache::SnapshotStore,
    diagnostics::{TraceBuffer, TraceBufferLayer},
    metrics::MetricsCollector,
    proxy::{DispatcherSettings, ProxyDispatcher},
    routing::RoutingTable,
    upstream::{HttpClientConfig, HttpDelegate},
};
use serde_json::{json, Value};
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;

/// Resolved hash of `(main, head)` in fixtures.
pub const HEAD_HASH: &str = "BLockHeadGvUSYb1mwYYv8SC8ioL7LsYh7YM6Bhtj1bzk5FpcfyHV";

/// Builds a dispatcher with the built-in routing table talking HTTP to `endpoint`.
///
/// # Panics
///
/// Panics if `endpoint` is not an http(s) URL.
#[must_use]
pub fn test_dispatcher(endpoint: &str, settings: DispatcherSettings) -> Arc<ProxyDispatcher> {
    let delegate = HttpDelegate::new(endpoint, HttpClientConfig::default(), Duration::from_secs(5))
        .unwrap_or_else(|e| panic!("invalid test endpoint {endpoint}: {e}"));
    let metrics = Arc::new(MetricsCollector::new());

    Arc::new(ProxyDispatcher::new(
        RoutingTable::default(),
        Arc::new(SnapshotStore::with_metrics(Arc::clone(&metrics))),
        Arc::new(delegate),
        metrics,
        settings,
    ))
}

/// A subscriber that records every facility line, plus the buffer it records into.
///
/// Install with `tracing::subscriber::set_default` on current-thread runtimes, or attach
/// to each spawned task with `WithSubscriber` on multi-thread runtimes.
#[must_use]
pub fn trace_capture() -> (Arc<TraceBuffer>, impl Subscriber + Send + Sync + 'static) {
    let buffer = Arc::new(TraceBuffer::new(4096));
    let subscriber =
        tracing_subscriber::registry().with(TraceBufferLayer::new(Arc::clone(&buffer)));
    (buffer, subscriber)
}

/// `proxy_rpc` line announcing a new replica.
#[must_use]
pub fn cache_created_line(chain: &str, block: &str) -> String {
    format!("proxy_rpc: proxy cache created for chain {chain} and block {block}")
}

/// `proxy_rpc_ctxt` line of a GET answered locally.
#[must_use]
pub fn done_locally_line(path: &str) -> String {
    format!("proxy_rpc_ctxt: Done GET json {path} locally")
}

/// `proxy_rpc_ctxt` line of a delegated request.
#[must_use]
pub fn delegating_line(verb: &str, path: &str) -> String {
    format!("proxy_rpc_ctxt: Delegating {verb} json {path} to http")
}

/// Protocol constants fixture.
#[must_use]
pub fn constants_fixture() -> Value {
    json!({
        "preserved_cycles": 3,
        "blocks_per_cycle": 4096,
        "blocks_per_commitment": 32,
        "time_between_blocks": ["30", "20"],
        "hard_gas_limit_per_block": "5200000"
    })
}

/// Registered delegates fixture.
#[must_use]
pub fn delegates_fixture() -> Value {
    json!([
        "tz1KqTpEZ7Yob7QbPE4Hy4Wo8fHG8LhKxZSx",
        "tz1b7tUupMgCNw2cCLpKTkSD1NZzB5TkP2sv",
        "tz1ddb9NMYHZi5UzPdzTZMYQQZoMub195zgv"
    ])
}

/// Baking rights fixture for `level`.
#[must_use]
pub fn baking_rights_fixture(level: u64) -> Value {
    json!([
        {"level": level, "delegate": "tz1KqTpEZ7Yob7QbPE4Hy4Wo8fHG8LhKxZSx", "priority": 0},
        {"level": level, "delegate": "tz1b7tUupMgCNw2cCLpKTkSD1NZzB5TkP2sv", "priority": 1}
    ])
}
