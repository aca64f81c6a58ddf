//! Context snapshot store.
//!
//! A [`ContextSnapshot`] is a partial replica of one block's context, built from a few
//! node round trips the first time a local request names its `(chain, block)`. The
//! [`SnapshotStore`] guarantees that construction happens at most once per key for the
//! lifetime of the process, whatever the interleaving of requests.
//!
//! ```text
//!  SnapshotStore
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ DashMap<SnapshotKey, Arc<OnceCell<Arc<ContextSnapshot>>>>    │
//!  └──────────────┬───────────────────────────────────────────────┘
//!                 │ (main, head)
//!                 ▼
//!  ContextSnapshot
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ identity: BlockIdentity { hash }                             │
//!  │ entries:  DashMap<subpath, Arc<OnceCell<Value>>>  write-once │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots are never evicted: block contexts are immutable once the block is
//! identified, so a replica cannot go stale.

pub mod snapshot;
pub mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SnapshotKey;

pub use snapshot::{BlockIdentity, ContextSnapshot, SnapshotSeed};
pub use store::{SnapshotStore, StoreStats};

/// Errors raised when reading from the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No snapshot has been created for the key.
    #[error("no context replica for chain {} and block {}", .0.chain, .0.block)]
    Absent(SnapshotKey),

    /// The snapshot exists but holds nothing at the subpath.
    #[error("{subpath} is not in the context replica of chain {} and block {}", .key.chain, .key.block)]
    Miss { key: SnapshotKey, subpath: String },
}

/// What a local request does when its subpath is not in the replica.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
    /// Fetch the subpath once, pinned to the snapshot's block hash, and record it.
    #[default]
    Extend,
    /// Answer with a not-found error.
    NotFound,
}
