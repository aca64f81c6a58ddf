use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::OnceCell;

use crate::{
    cache::{
        snapshot::{ContextSnapshot, SnapshotSeed},
        StoreError,
    },
    diagnostics::TraceEvent,
    metrics::MetricsCollector,
    types::SnapshotKey,
};

/// Point-in-time view of the store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Snapshots currently held.
    pub entries: usize,
    /// Snapshots constructed since start.
    pub creations: u64,
    /// `get_or_create` calls answered by an existing snapshot.
    pub hits: u64,
    /// Construction attempts that failed and stored nothing.
    pub creation_failures: u64,
    /// Subpaths added to an existing snapshot after creation.
    pub extensions: u64,
}

#[derive(Debug, Default)]
struct StoreCounters {
    creations: AtomicU64,
    hits: AtomicU64,
    creation_failures: AtomicU64,
    extensions: AtomicU64,
}

type SnapshotSlot = Arc<OnceCell<Arc<ContextSnapshot>>>;

/// Process-wide map from `(chain, block)` to its context snapshot.
///
/// Each key owns a once-initialized slot. Creation is serialized per key by the slot,
/// and unrelated keys never contend beyond a map shard. Snapshots are never evicted.
///
/// # Creation
///
/// ```text
/// get_or_create(key, fetch)
///     │
///     ├── slot initialized? ──► hit, return the snapshot
///     │
///     └── OnceCell::get_or_try_init
///             ├── another caller is initializing ──► wait, then reuse its result
///             ├── fetch(key) Ok  ──► store, trace "proxy cache created …", return
///             └── fetch(key) Err ──► store nothing, propagate (next caller retries)
/// ```
///
/// If the caller that is running `fetch` is dropped mid-flight, the slot stays empty
/// and one of the waiters runs its own `fetch` instead.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: DashMap<SnapshotKey, SnapshotSlot>,
    counters: StoreCounters,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that also reports creations to `metrics`.
    #[must_use]
    pub fn with_metrics(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics: Some(metrics), ..Self::default() }
    }

    /// Returns the snapshot for `key`, constructing it from `fetch(key)` if none exists.
    ///
    /// # Errors
    ///
    /// Propagates the error of `fetch` unchanged; nothing is stored in that case.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: &SnapshotKey,
        fetch: F,
    ) -> Result<Arc<ContextSnapshot>, E>
    where
        F: FnOnce(SnapshotKey) -> Fut,
        Fut: Future<Output = Result<SnapshotSeed, E>>,
    {
        let slot = self.slot(key);
        if let Some(snapshot) = slot.get() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(snapshot));
        }

        let mut created = false;
        let snapshot = slot
            .get_or_try_init(|| async {
                match fetch(key.clone()).await {
                    Ok(seed) => {
                        created = true;
                        Ok(Arc::new(self.create(key, seed)))
                    }
                    Err(e) => {
                        self.counters.creation_failures.fetch_add(1, Ordering::Relaxed);
                        if let Some(metrics) = &self.metrics {
                            metrics.record_snapshot_failed();
                        }
                        tracing::debug!(key = %key, "snapshot creation failed");
                        Err(e)
                    }
                }
            })
            .await?;

        if !created {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Arc::clone(snapshot))
    }

    fn create(&self, key: &SnapshotKey, seed: SnapshotSeed) -> ContextSnapshot {
        let snapshot = ContextSnapshot::new(key.clone(), seed);

        self.counters.creations.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_created();
        }
        TraceEvent::CacheCreated { chain: &key.chain, block: &key.block }.emit();
        tracing::trace!(
            key = %key,
            hash = snapshot.identity().hash(),
            entries = snapshot.len(),
            "snapshot stored"
        );

        snapshot
    }

    /// Returns the snapshot for `key` if it has been created.
    #[must_use]
    pub fn get(&self, key: &SnapshotKey) -> Option<Arc<ContextSnapshot>> {
        self.snapshots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Reads the entry replicated for `subpath` in the snapshot for `key`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Absent`] if no snapshot exists for `key`
    /// - [`StoreError::Miss`] if the snapshot holds nothing at `subpath`
    pub fn read(&self, key: &SnapshotKey, subpath: &str) -> Result<Value, StoreError> {
        let snapshot = self.get(key).ok_or_else(|| StoreError::Absent(key.clone()))?;
        snapshot
            .read(subpath)
            .ok_or_else(|| StoreError::Miss { key: key.clone(), subpath: subpath.to_string() })
    }

    /// Adds `subpath` to an existing snapshot by running `fetch` once.
    ///
    /// Returns the recorded value. If the subpath was already present (or another
    /// caller recorded it first) that value is returned and `fetch` is not run.
    ///
    /// # Errors
    ///
    /// Propagates the error of `fetch` unchanged; nothing is recorded in that case.
    pub async fn extend<F, Fut, E>(
        &self,
        snapshot: &ContextSnapshot,
        subpath: &str,
        fetch: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        snapshot
            .extend_with(subpath, || async {
                let value = fetch().await?;
                self.counters.extensions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %snapshot.key(), subpath = subpath, "snapshot extended");
                Ok::<_, E>(value)
            })
            .await
    }

    /// Number of created snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.iter().filter(|slot| slot.value().initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.len(),
            creations: self.counters.creations.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            creation_failures: self.counters.creation_failures.load(Ordering::Relaxed),
            extensions: self.counters.extensions.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: &SnapshotKey) -> SnapshotSlot {
        if let Some(slot) = self.snapshots.get(key) {
            return Arc::clone(&slot);
        }
        Arc::clone(&*self.snapshots.entry(key.clone()).or_default())
    }
}
