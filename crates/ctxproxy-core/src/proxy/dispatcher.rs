use futures::future;
use serde_json::Value;
use std::{sync::Arc, time::Instant};

use crate::{
    cache::{BlockIdentity, MissPolicy, SnapshotSeed, SnapshotStore, StoreError},
    config::{AppConfig, CacheConfig},
    diagnostics::TraceEvent,
    metrics::MetricsCollector,
    routing::{Route, RoutingTable},
    types::{RequestPath, RoutingDecision, RpcRequest, SnapshotKey, Verb, MEDIA_KIND_JSON},
    upstream::{HttpDelegate, RemoteDelegate, UpstreamError},
};

use super::errors::ProxyError;

/// Lifecycle of one request through the dispatcher.
///
/// ```text
/// Received ──► Classified ──┬──► Resolving ──┬──► Answered
///                           │                └──► Failed
///                           └──► Delegating ─┬──► Answered
///                                            └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Classified(Route),
    Resolving,
    Delegating,
    Answered,
    Failed,
}

impl RequestState {
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Classified(_)) |
                (Self::Classified(Route::Local), Self::Resolving) |
                (Self::Classified(_), Self::Delegating) |
                (Self::Resolving | Self::Delegating, Self::Answered | Self::Failed)
        )
    }

    fn advance(self, next: Self) -> Self {
        debug_assert!(self.can_advance_to(next), "illegal transition {self:?} -> {next:?}");
        tracing::trace!(from = ?self, to = ?next, "request state");
        next
    }
}

/// Replica behavior of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub miss_policy: MissPolicy,
    /// Block-relative subpaths fetched when a snapshot is created.
    pub prefetch: Vec<String>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for DispatcherSettings {
    fn from(config: &CacheConfig) -> Self {
        Self { miss_policy: config.miss_policy, prefetch: config.prefetch.clone() }
    }
}

/// Receives RPC requests and answers them locally or through the node.
///
/// For a local request the dispatcher materializes the snapshot of the request's
/// `(chain, block)` on first use (at most once per process, see [`SnapshotStore`]),
/// then answers from the entry replicated for the request's subpath. Everything else is forwarded verbatim.
/// Each request logs exactly one routing line on `proxy_rpc_ctxt`.
///
/// Errors are returned as they occur: a failed local resolution is never retried
/// through delegation.
pub struct ProxyDispatcher {
    routes: RoutingTable,
    store: Arc<SnapshotStore>,
    delegate: Arc<dyn RemoteDelegate>,
    metrics: Arc<MetricsCollector>,
    settings: DispatcherSettings,
}

impl ProxyDispatcher {
    #[must_use]
    pub fn new(
        routes: RoutingTable,
        store: Arc<SnapshotStore>,
        delegate: Arc<dyn RemoteDelegate>,
        metrics: Arc<MetricsCollector>,
        settings: DispatcherSettings,
    ) -> Self {
        Self { routes, store, delegate, metrics, settings }
    }

    /// Wires a dispatcher talking HTTP to the configured node.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] if the routing overrides are invalid, or
    /// [`ProxyError::Upstream`] if the node endpoint is unusable.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProxyError> {
        let routes = config.routing_table().map_err(|e| ProxyError::Config(e.to_string()))?;
        let delegate = HttpDelegate::new(
            &config.node.endpoint,
            config.node.http_client_config(),
            config.node.timeout(),
        )?;
        let metrics = Arc::new(MetricsCollector::new());
        let store = Arc::new(SnapshotStore::with_metrics(Arc::clone(&metrics)));

        Ok(Self::new(
            routes,
            store,
            Arc::new(delegate),
            metrics,
            DispatcherSettings::from(&config.cache),
        ))
    }

    /// Dispatches one request.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::Upstream`] if the node round trip failed (delegation, snapshot
    ///   creation or replica extension)
    /// - [`ProxyError::NotFound`] if the subpath is absent and the miss policy is
    ///   `not_found`
    pub async fn dispatch(&self, request: RpcRequest) -> Result<Value, ProxyError> {
        let started = Instant::now();
        let state = RequestState::Received;

        let route = self.routes.classify(request.verb, &request.path);
        let state = state.advance(RequestState::Classified(route));

        let local_key = match route {
            Route::Local => request.path.snapshot_key(),
            Route::RemoteOnly => None,
        };

        let (state, decision, result) = match local_key {
            Some(key) => {
                let state = state.advance(RequestState::Resolving);
                (state, RoutingDecision::Local, self.resolve_locally(&request, key).await)
            }
            None => {
                let state = state.advance(RequestState::Delegating);
                (state, RoutingDecision::Delegated, self.delegate_request(&request).await)
            }
        };

        match &result {
            Ok(_) => {
                state.advance(RequestState::Answered);
            }
            Err(e) => {
                state.advance(RequestState::Failed);
                if let ProxyError::Upstream(upstream) = e {
                    self.metrics.record_upstream_error(upstream);
                }
                tracing::debug!(
                    verb = %request.verb,
                    path = request.path.as_str(),
                    decision = decision.as_str(),
                    error = %e,
                    "request failed"
                );
            }
        }

        self.metrics.record_request(decision, result.is_ok(), started.elapsed());
        result
    }

    /// Dispatches `GET path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidRequest`] for an unparsable path, otherwise as
    /// [`dispatch`](Self::dispatch).
    pub async fn get(&self, path: &str) -> Result<Value, ProxyError> {
        self.dispatch(RpcRequest::get(path)?).await
    }

    /// Dispatches `verb path` with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidRequest`] for an unparsable path, otherwise as
    /// [`dispatch`](Self::dispatch).
    pub async fn call(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ProxyError> {
        self.dispatch(RpcRequest::new(verb, RequestPath::parse(path)?, body)).await
    }

    async fn resolve_locally(
        &self,
        request: &RpcRequest,
        key: &SnapshotKey,
    ) -> Result<Value, ProxyError> {
        let subpath = request.path.subpath_with_query().unwrap_or_default();
        let snapshot = self.store.get_or_create(key, |key| self.fetch_all_for(key)).await?;

        let value = match self.store.read(key, &subpath) {
            Ok(value) => value,
            Err(StoreError::Miss { .. }) if self.settings.miss_policy == MissPolicy::Extend => {
                let hash = snapshot.identity().hash();
                self.store
                    .extend(&snapshot, &subpath, || self.delegate.fetch(&key.chain, hash, &subpath))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        TraceEvent::DoneLocally {
            verb: request.verb,
            kind: MEDIA_KIND_JSON,
            path: request.path.as_str(),
        }
        .emit();
        Ok(value)
    }

    /// Builds the seed of a snapshot: resolves the block id to its hash, then fetches
    /// the prefetch subpaths pinned to that hash.
    async fn fetch_all_for(&self, key: SnapshotKey) -> Result<SnapshotSeed, UpstreamError> {
        let identity = match self.delegate.fetch(&key.chain, key.block.as_str(), "hash").await? {
            Value::String(hash) => BlockIdentity::new(hash),
            other => {
                return Err(UpstreamError::InvalidResponse(format!(
                    "block hash of {key} is not a string: {other}"
                )))
            }
        };

        let entries = future::try_join_all(self.settings.prefetch.iter().map(|subpath| {
            let (key, identity) = (&key, &identity);
            async move {
                let value = self.delegate.fetch(&key.chain, identity.hash(), subpath).await?;
                Ok::<_, UpstreamError>((subpath.clone(), value))
            }
        }))
        .await?;

        tracing::debug!(
            key = %key,
            hash = identity.hash(),
            prefetched = entries.len(),
            "context replica fetched"
        );
        Ok(SnapshotSeed { identity, entries })
    }

    /// Forwards the request verbatim.
    async fn delegate_request(&self, request: &RpcRequest) -> Result<Value, ProxyError> {
        TraceEvent::Delegating {
            verb: request.verb,
            kind: MEDIA_KIND_JSON,
            path: request.path.as_str(),
        }
        .emit();

        Ok(self.delegate.call(request.verb, request.path.as_str(), request.body.as_ref()).await?)
    }

    #[must_use]
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    #[must_use]
    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }
}
