use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use ctxproxy_core::{
    config::AppConfig,
    diagnostics::TraceBuffer,
    proxy::{ProxyDispatcher, ProxyError},
    types::Verb,
    upstream::FetchErrorKind,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

use crate::middleware;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default number of records returned by `/debug/traces`.
const DEFAULT_TRACE_LIMIT: usize = 100;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ProxyDispatcher>,
    pub traces: Arc<TraceBuffer>,
}

impl AppState {
    #[must_use]
    pub fn new(dispatcher: Arc<ProxyDispatcher>, traces: Arc<TraceBuffer>) -> Self {
        Self { dispatcher, traces }
    }
}

/// Limits applied to the whole router.
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub metrics_enabled: bool,
}

impl From<&AppConfig> for RouterLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent_requests: config.server.max_concurrent_requests,
            request_timeout: config.request_timeout(),
            metrics_enabled: config.metrics.enabled,
        }
    }
}

/// Builds the application router.
///
/// Operational endpoints are matched first; every other path falls through to the
/// dispatcher.
pub fn create_app(state: AppState, limits: RouterLimits) -> Router {
    let (set_request_id, propagate_request_id) = middleware::create_request_id_layers();

    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/debug/traces", get(handle_traces));

    if limits.metrics_enabled {
        app = app.route("/metrics", get(handle_metrics));
    }

    app.fallback(handle_rpc)
        .with_state(state)
        // One semaphore shared by every route, unlike `ConcurrencyLimitLayer`.
        .layer(GlobalConcurrencyLimitLayer::new(limits.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(middleware::create_trace_layer())
        .layer(propagate_request_id)
        .layer(set_request_id)
}

/// Serves one node-shaped RPC: `<verb> <path>[?query]` with an optional JSON body.
pub async fn handle_rpc(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let verb = match method.as_str().parse::<Verb>() {
        Ok(verb) => verb,
        Err(e) => return error_response(&ProxyError::from(e)),
    };

    let path = uri.path_and_query().map_or_else(|| uri.path(), |pq| pq.as_str());

    let body = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                return error_response(&ProxyError::InvalidRequest(format!(
                    "request body is not JSON: {e}"
                )))
            }
        }
    };

    match state.dispatcher.call(verb, path, body).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Maps a dispatcher failure onto the node's error envelope.
///
/// A protocol failure relays the node's own status, and its body when that body is still
/// JSON. Any other failure gets a single-entry envelope.
fn error_response(err: &ProxyError) -> Response {
    if let ProxyError::Upstream(upstream) = err {
        if let Some(code) = upstream.status() {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
            if let ctxproxy_core::upstream::UpstreamError::HttpError(_, body) = upstream {
                if let Ok(relayed) = serde_json::from_str::<Value>(body) {
                    return (status, Json(relayed)).into_response();
                }
            }
            return (status, Json(error_envelope(err))).into_response();
        }
    }

    (error_status(err), Json(error_envelope(err))).into_response()
}

fn error_status(err: &ProxyError) -> StatusCode {
    match err {
        ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ProxyError::NotFound { .. } => StatusCode::NOT_FOUND,
        ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ProxyError::Store(_) | ProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_envelope(err: &ProxyError) -> Value {
    let (kind, id) = match err {
        ProxyError::InvalidRequest(_) => ("permanent", "proxy.invalid_request"),
        ProxyError::NotFound { .. } => ("permanent", "proxy.context_not_found"),
        ProxyError::Upstream(_) => match err.fetch_kind() {
            Some(FetchErrorKind::Protocol) => ("permanent", "proxy.node_protocol_error"),
            _ => ("temporary", "proxy.node_unreachable"),
        },
        ProxyError::Store(_) | ProxyError::Config(_) => ("permanent", "proxy.internal_error"),
    };

    json!([{ "kind": kind, "id": id, "msg": err.to_string() }])
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let prometheus_metrics = state.dispatcher.metrics().get_prometheus_metrics();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        prometheus_metrics,
    )
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.dispatcher.store().stats();
    let requests = state.dispatcher.metrics().summary();

    Json(json!({
        "status": "healthy",
        "store": store,
        "requests": requests,
        "miss_policy": state.dispatcher.settings().miss_policy,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[derive(Debug, Deserialize)]
pub struct TraceQuery {
    pub limit: Option<usize>,
}

/// Most recent facility lines, newest first.
#[allow(clippy::unused_async)]
pub async fn handle_traces(
    State(state): State<AppState>,
    Query(query): Query<TraceQuery>,
) -> impl IntoResponse {
    Json(state.traces.recent(query.limit.unwrap_or(DEFAULT_TRACE_LIMIT)))
}
