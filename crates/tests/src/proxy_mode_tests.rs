//! Integration tests for proxy-mode request handling.
//!
//! These drive the `ProxyDispatcher` against a mocked node over real HTTP and check the
//! routing decision, the replica lifecycle and the facility lines of every request.

use crate::mock_infrastructure::{
    baking_rights_fixture, cache_created_line, constants_fixture, delegates_fixture,
    delegating_line, done_locally_line, test_dispatcher, trace_capture, NodeMockBuilder,
    HEAD_HASH,
};
use ctxproxy_core::{
    proxy::{DispatcherSettings, ProxyError},
    routing::Route,
    types::{RequestPath, Verb},
    upstream::{RemoteDelegate, UpstreamError},
};
use serde_json::json;

const DELEGATES_PATH: &str = "/chains/main/blocks/head/context/delegates";
const CONSTANTS_PATH: &str = "/chains/main/blocks/head/context/constants";
const BLOCKS_PATH: &str = "/chains/main/blocks";

async fn head_node() -> NodeMockBuilder {
    let mut node = NodeMockBuilder::new().await;
    node.mock_block_hash("main", "head", HEAD_HASH)
        .mock_context("main", HEAD_HASH, "context/constants", &constants_fixture())
        .mock_context("main", HEAD_HASH, "context/delegates", &delegates_fixture())
        .mock_get(BLOCKS_PATH, &json!([[HEAD_HASH]]));
    node
}

#[tokio::test]
async fn test_context_queries_on_head_share_one_replica() {
    let node = head_node().await;
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let delegates = dispatcher.get(DELEGATES_PATH).await.unwrap();
    assert_eq!(delegates, delegates_fixture());
    assert_eq!(traces.cache_creations(), vec![("main".to_string(), "head".to_string())]);

    let created = traces.position(&cache_created_line("main", "head")).unwrap();
    let done = traces.position(&done_locally_line(DELEGATES_PATH)).unwrap();
    assert!(created < done, "cache line must precede the first local answer");

    let constants = dispatcher.get(CONSTANTS_PATH).await.unwrap();
    assert_eq!(constants, constants_fixture());
    assert_eq!(traces.cache_creations().len(), 1, "no second replica for the same key");
    assert_eq!(traces.count_line(&done_locally_line(CONSTANTS_PATH)), 1);

    let blocks = dispatcher.get(BLOCKS_PATH).await.unwrap();
    assert_eq!(blocks, json!([[HEAD_HASH]]));
    assert_eq!(traces.count_line(&delegating_line("GET", BLOCKS_PATH)), 1);
    assert_eq!(traces.cache_creations().len(), 1);
    assert_eq!(traces.count_line(&done_locally_line(BLOCKS_PATH)), 0);

    node.assert_all().await;
}

#[tokio::test]
async fn test_each_request_logs_exactly_one_routing_line() {
    let node = head_node().await;
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let paths = [CONSTANTS_PATH, BLOCKS_PATH, DELEGATES_PATH, BLOCKS_PATH, CONSTANTS_PATH];
    for path in paths {
        dispatcher.get(path).await.unwrap();
    }

    let routing_lines: Vec<String> = traces
        .lines()
        .into_iter()
        .filter(|line| line.starts_with("proxy_rpc_ctxt: "))
        .collect();
    assert_eq!(routing_lines.len(), paths.len());

    for (line, path) in routing_lines.iter().zip(paths) {
        let expected = if path == BLOCKS_PATH {
            delegating_line("GET", path)
        } else {
            done_locally_line(path)
        };
        assert_eq!(line, &expected);
    }
}

#[tokio::test]
async fn test_delegated_answer_equals_direct_node_answer() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_get("/network/self", &json!("idrjPLZpBBGGmGs9Ee5yRvDGeg9M3e"))
        .mock_get(BLOCKS_PATH, &json!([[HEAD_HASH, "BLockParent"]]));
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());

    let delegate = ctxproxy_core::upstream::HttpDelegate::new(
        &node.url(),
        ctxproxy_core::upstream::HttpClientConfig::default(),
        std::time::Duration::from_secs(5),
    )
    .unwrap();

    for path in ["/network/self", BLOCKS_PATH] {
        let proxied = dispatcher.get(path).await.unwrap();
        let direct = delegate.call(Verb::Get, path, None).await.unwrap();
        assert_eq!(proxied, direct, "{path}");
    }
    assert!(dispatcher.store().is_empty());
}

#[tokio::test]
async fn test_local_reads_are_stable() {
    let node = head_node().await;
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());

    let first = dispatcher.get(DELEGATES_PATH).await.unwrap();
    let second = dispatcher.get(DELEGATES_PATH).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, delegates_fixture());
    assert_eq!(dispatcher.store().stats().extensions, 1);
}

#[tokio::test]
async fn test_nested_path_is_answered_like_the_node() {
    let mut node = head_node().await;
    let nested = format!("/chains/main/blocks/{HEAD_HASH}/context/delegates/1");
    node.mock_error(&nested, 404, "No service found");
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    dispatcher.get(DELEGATES_PATH).await.unwrap();
    let proxied = dispatcher.get(&format!("{DELEGATES_PATH}/1")).await.unwrap_err();

    assert!(
        matches!(proxied, ProxyError::Upstream(UpstreamError::HttpError(404, ref body)) if body == "No service found"),
        "{proxied:?}"
    );
    assert_eq!(traces.count_line(&done_locally_line(&format!("{DELEGATES_PATH}/1"))), 0);
}

/// Block-relative RPCs a light client issues against a block, `context/constants`
/// twice on purpose.
const CLIENT_PATHS: [&str; 18] = [
    "context/constants",
    "helpers/baking_rights",
    "helpers/baking_rights?&all=true",
    "helpers/current_level",
    "minimal_valid_time",
    "context/constants",
    "context/constants/errors",
    "context/delegates",
    "context/nonces/3",
    "helpers/endorsing_rights",
    "helpers/levels_in_current_cycle",
    "votes/ballot_list",
    "votes/ballots",
    "votes/current_period_kind",
    "votes/current_proposal",
    "votes/current_quorum",
    "votes/listings",
    "votes/proposals",
];

#[tokio::test]
async fn test_light_client_paths_share_one_replica() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_block_hash("main", "head", HEAD_HASH);
    let mut distinct: Vec<&str> = CLIENT_PATHS.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    for subpath in &distinct {
        node.mock_get_times(
            &format!("/chains/main/blocks/{HEAD_HASH}/{subpath}"),
            &json!({ "rpc": subpath }),
            1,
        );
    }

    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    for subpath in CLIENT_PATHS {
        let path = format!("/chains/main/blocks/head/{subpath}");
        let answer = dispatcher.get(&path).await.unwrap();
        assert_eq!(answer, json!({ "rpc": subpath }), "{path}");
        assert!(traces.count_line(&done_locally_line(&path)) > 0, "{path}");
    }

    assert_eq!(traces.count_line(&cache_created_line("main", "head")), 1);
    assert_eq!(traces.cache_creations().len(), 1);
    assert_eq!(
        traces.lines().iter().filter(|line| line.starts_with("proxy_rpc_ctxt: Done ")).count(),
        CLIENT_PATHS.len()
    );
    assert!(traces.lines().iter().all(|line| !line.contains("Delegating")));
    assert_eq!(dispatcher.store().stats().creations, 1);
    assert_eq!(dispatcher.store().stats().extensions, distinct.len() as u64 - 1);
    node.assert_all().await;
}

#[tokio::test]
async fn test_baking_rights_query_is_answered_locally() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_block_hash("main", "head", HEAD_HASH)
        .mock_context("main", HEAD_HASH, "context/constants", &constants_fixture())
        .mock_context(
            "main",
            HEAD_HASH,
            "helpers/baking_rights?level=42&max_priority=1",
            &baking_rights_fixture(42),
        );
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let path = "/chains/main/blocks/head/helpers/baking_rights?level=42&max_priority=1";
    let rights = dispatcher.get(path).await.unwrap();

    assert_eq!(rights, baking_rights_fixture(42));
    assert_eq!(traces.count_line(&done_locally_line(path)), 1);
    assert_eq!(traces.cache_creations().len(), 1);
}

#[tokio::test]
async fn test_non_get_verbs_are_always_delegated() {
    let mut node = NodeMockBuilder::new().await;
    node.mock_call(
        "POST",
        "/chains/main/blocks/head/helpers/scripts/run_operation",
        &json!({"contents": []}),
    );
    let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
    let (traces, subscriber) = trace_capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let path = "/chains/main/blocks/head/helpers/scripts/run_operation";
    let answer = dispatcher.call(Verb::Post, path, Some(json!({"operation": {}}))).await.unwrap();

    assert_eq!(answer, json!({"contents": []}));
    assert_eq!(traces.count_line(&delegating_line("POST", path)), 1);
    assert!(traces.cache_creations().is_empty());
}

#[test]
fn test_dispatcher_routing_table() {
    let dispatcher = test_dispatcher("http://127.0.0.1:9", DispatcherSettings::default());
    let routes = dispatcher.routes();

    let cases = [
        ("/chains/main/blocks/head/context/constants", Route::Local),
        ("/chains/main/blocks/head/context/delegates/tz1b7tUupMgCNw2cCL", Route::Local),
        ("/chains/main/blocks/head/helpers/baking_rights", Route::Local),
        ("/chains/main/blocks/head/helpers/current_level?offset=1", Route::Local),
        ("/chains/main/blocks/head/minimal_valid_time", Route::Local),
        ("/chains/main/blocks/head/helpers/endorsing_rights", Route::Local),
        ("/chains/main/blocks/head/helpers/levels_in_current_cycle", Route::Local),
        ("/chains/main/blocks/head/votes/listings", Route::Local),
        ("/chains/main/blocks", Route::RemoteOnly),
        ("/network/self", Route::RemoteOnly),
        ("/chains/main/blocks/head/header", Route::RemoteOnly),
        ("/version", Route::RemoteOnly),
    ];

    for (path, expected) in cases {
        let path = RequestPath::parse(path).unwrap();
        assert_eq!(routes.classify(Verb::Get, &path), expected, "{path}");
    }
}
