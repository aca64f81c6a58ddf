use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Instant};
use tokio::sync::OnceCell;

use crate::types::SnapshotKey;

/// Concrete identity a block id resolved to when its snapshot was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockIdentity {
    hash: String,
}

impl BlockIdentity {
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Everything fetched from the node to build one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotSeed {
    pub identity: BlockIdentity,
    /// `(subpath, value)` pairs replicated up front.
    pub entries: Vec<(String, Value)>,
}

/// Partial replica of one block's context.
///
/// Entries are keyed by block-relative subpath (query included) and are write-once:
/// the cell behind a subpath is initialized at most once and never replaced, so two
/// reads of the same subpath always observe the same JSON.
#[derive(Debug)]
pub struct ContextSnapshot {
    key: SnapshotKey,
    identity: BlockIdentity,
    created_at: Instant,
    entries: DashMap<String, Arc<OnceCell<Value>>>,
}

impl ContextSnapshot {
    #[must_use]
    pub fn new(key: SnapshotKey, seed: SnapshotSeed) -> Self {
        let entries = DashMap::with_capacity(seed.entries.len());
        for (subpath, value) in seed.entries {
            entries.insert(normalize(&subpath).to_string(), Arc::new(OnceCell::new_with(Some(value))));
        }

        Self { key, identity: seed.identity, created_at: Instant::now(), entries }
    }

    #[must_use]
    pub fn key(&self) -> &SnapshotKey {
        &self.key
    }

    #[must_use]
    pub fn identity(&self) -> &BlockIdentity {
        &self.identity
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Number of replicated subpaths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value replicated for exactly `subpath`.
    ///
    /// Subpaths are RPC paths, not pointers into replicated JSON: `context/constants/errors`
    /// is its own RPC with its own answer, so only an entry recorded under the same
    /// subpath (query included) is served.
    #[must_use]
    pub fn read(&self, subpath: &str) -> Option<Value> {
        self.entry(normalize(subpath))
    }

    /// Returns the replicated value of `subpath`, fetching and recording it with `fetch`
    /// if it is absent.
    ///
    /// Concurrent callers on the same subpath share a single `fetch`. If it fails
    /// nothing is recorded and a later call may try again.
    pub(crate) async fn extend_with<F, Fut, E>(&self, subpath: &str, fetch: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let cell = Arc::clone(&*self.entries.entry(normalize(subpath).to_string()).or_default());
        cell.get_or_try_init(fetch).await.cloned()
    }

    fn entry(&self, subpath: &str) -> Option<Value> {
        self.entries.get(subpath).and_then(|cell| cell.get().cloned())
    }
}

fn normalize(subpath: &str) -> &str {
    subpath.trim_matches('/')
}
