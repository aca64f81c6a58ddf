//! Concurrency tests for replica creation.
//!
//! Many requests race on one block context; the node must see a single resolution of the
//! block and the diagnostic channel a single "cache created" line per key.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use ctxproxy_core::{
    cache::SnapshotStore,
    metrics::MetricsCollector,
    proxy::{DispatcherSettings, ProxyDispatcher},
    routing::RoutingTable,
    types::Verb,
    upstream::{RemoteDelegate, UpstreamError},
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{instrument::WithSubscriber, Dispatch};

use crate::mock_infrastructure::{
    cache_created_line, constants_fixture, delegates_fixture, done_locally_line,
    test_dispatcher, trace_capture, NodeMockBuilder, HEAD_HASH,
};

const CONSTANTS_PATH: &str = "/chains/main/blocks/head/context/constants";
const DELEGATES_PATH: &str = "/chains/main/blocks/head/context/delegates";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_create_one_replica() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_block_hash("main", "head", HEAD_HASH)
        .mock_context("main", HEAD_HASH, "context/constants", &constants_fixture())
        .mock_get_times(
            &format!("/chains/main/blocks/{HEAD_HASH}/context/delegates"),
            &delegates_fixture(),
            1,
        );

    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let dispatch = Dispatch::new(subscriber);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let path = if i % 2 == 0 { CONSTANTS_PATH } else { DELEGATES_PATH };
            tokio::spawn(
                async move { dispatcher.get(path).await }.with_subscriber(dispatch.clone()),
            )
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let answer = handle.await.unwrap().unwrap();
        let expected = if i % 2 == 0 { constants_fixture() } else { delegates_fixture() };
        assert_eq!(answer, expected);
    }

    assert_eq!(traces.count_line(&cache_created_line("main", "head")), 1);
    assert_eq!(traces.count_line(&done_locally_line(CONSTANTS_PATH)), 16);
    assert_eq!(traces.count_line(&done_locally_line(DELEGATES_PATH)), 16);

    let stats = dispatcher.store().stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.creations, 1);
    assert_eq!(stats.extensions, 1);

    node.assert_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_blocks_get_distinct_replicas() {
    let blocks = ["BLockA", "BLockB", "BLockC"];
    let mut node = NodeMockBuilder::new().await;
    for block in blocks {
        node.mock_block_hash("main", block, block).mock_context(
            "main",
            block,
            "context/constants",
            &json!({"block": block}),
        );
    }

    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let dispatch = Dispatch::new(subscriber);

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let block = blocks[i % blocks.len()];
            tokio::spawn(
                async move {
                    let path = format!("/chains/main/blocks/{block}/context/constants");
                    (block, dispatcher.get(&path).await)
                }
                .with_subscriber(dispatch.clone()),
            )
        })
        .collect();

    for handle in handles {
        let (block, answer) = handle.await.unwrap();
        assert_eq!(answer.unwrap(), json!({"block": block}));
    }

    let mut created = traces.cache_creations();
    created.sort();
    assert_eq!(
        created,
        blocks.iter().map(|b| ("main".to_string(), (*b).to_string())).collect::<Vec<_>>()
    );
    assert_eq!(dispatcher.store().stats().creations, 3);
    node.assert_all().await;
}

/// Node whose first block resolution never answers; later ones answer immediately.
#[derive(Default)]
struct StallingNode {
    stalled: AtomicBool,
    entered: Notify,
}

#[async_trait]
impl RemoteDelegate for StallingNode {
    async fn call(
        &self,
        _verb: Verb,
        path: &str,
        _body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        if path.ends_with("/hash") {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                std::future::pending::<()>().await;
            }
            return Ok(json!(HEAD_HASH));
        }
        if path.ends_with("/context/constants") {
            return Ok(constants_fixture());
        }
        Err(UpstreamError::HttpError(404, format!("no mock for {path}")))
    }
}

#[tokio::test]
async fn test_aborted_creation_is_taken_over_by_a_waiter() {
    let node = Arc::new(StallingNode::default());
    let metrics = Arc::new(MetricsCollector::new());
    let dispatcher = Arc::new(ProxyDispatcher::new(
        RoutingTable::default(),
        Arc::new(SnapshotStore::with_metrics(Arc::clone(&metrics))),
        Arc::clone(&node) as Arc<dyn RemoteDelegate>,
        metrics,
        DispatcherSettings::default(),
    ));
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let first = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.get(CONSTANTS_PATH).await }
    });
    node.entered.notified().await;

    let second = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.get(CONSTANTS_PATH).await }
    });
    tokio::task::yield_now().await;

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let answer = second.await.unwrap().unwrap();
    assert_eq!(answer, constants_fixture());
    assert_eq!(traces.count_line(&cache_created_line("main", "head")), 1);
    assert_eq!(traces.count_line(&done_locally_line(CONSTANTS_PATH)), 1);
    assert_eq!(dispatcher.store().stats().creations, 1);
}
