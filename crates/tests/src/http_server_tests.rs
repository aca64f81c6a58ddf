//! End-to-end tests through the HTTP front end.
//!
//! A real listener serves the router; requests go through reqwest exactly as a client
//! would send them.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use ctxproxy_core::{diagnostics::TraceBuffer, proxy::DispatcherSettings};
use serde_json::{json, Value};
use server::router::{create_app, AppState, RouterLimits};

use crate::mock_infrastructure::{
    cache_created_line, constants_fixture, delegates_fixture, delegating_line,
    done_locally_line, test_dispatcher, trace_capture, NodeMockBuilder, HEAD_HASH,
};

async fn spawn_proxy(node_url: &str) -> SocketAddr {
    let dispatcher = test_dispatcher(node_url, DispatcherSettings::default());
    let state = AppState::new(dispatcher, Arc::new(TraceBuffer::new(64)));
    let limits = RouterLimits {
        max_concurrent_requests: 32,
        request_timeout: Duration::from_secs(10),
        metrics_enabled: true,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(state, limits)).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_proxy_session_over_http() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_block_hash("main", "head", HEAD_HASH)
        .mock_context("main", HEAD_HASH, "context/constants", &constants_fixture())
        .mock_context("main", HEAD_HASH, "context/delegates", &delegates_fixture())
        .mock_get("/chains/main/blocks", &json!([[HEAD_HASH]]));

    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let addr = spawn_proxy(&node.url()).await;
    let client = reqwest::Client::new();

    let delegates: Value = client
        .get(format!("http://{addr}/chains/main/blocks/head/context/delegates"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(delegates, delegates_fixture());

    let constants: Value = client
        .get(format!("http://{addr}/chains/main/blocks/head/context/constants"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(constants, constants_fixture());

    let blocks: Value = client
        .get(format!("http://{addr}/chains/main/blocks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(blocks, json!([[HEAD_HASH]]));

    assert_eq!(
        traces.lines(),
        vec![
            cache_created_line("main", "head"),
            done_locally_line("/chains/main/blocks/head/context/delegates"),
            done_locally_line("/chains/main/blocks/head/context/constants"),
            delegating_line("GET", "/chains/main/blocks"),
        ]
    );

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["store"]["creations"], 1);
    assert_eq!(health["requests"]["local_requests"], 2);
    assert_eq!(health["requests"]["delegated_requests"], 1);

    node.assert_all().await;
}

#[tokio::test]
async fn test_node_failure_becomes_error_envelope() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_error("/chains/main/blocks/head/hash", 500, "internal error");

    let addr = spawn_proxy(&node.url()).await;

    let response = reqwest::get(format!("http://{addr}/chains/main/blocks/head/context/constants"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope[0]["kind"], "permanent");
    assert_eq!(envelope[0]["id"], "proxy.node_protocol_error");
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let node = NodeMockBuilder::new().await;
    let addr = spawn_proxy(&node.url()).await;

    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/plain")));
}
