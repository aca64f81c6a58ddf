//! Diagnostic trace lines.
//!
//! The proxy reports its decisions on two facilities, each a `tracing` target:
//!
//! | facility         | line                                                    |
//! |------------------|---------------------------------------------------------|
//! | `proxy_rpc`      | `proxy cache created for chain <chain> and block <block>` |
//! | `proxy_rpc_ctxt` | `Done <verb> <kind> <path> locally`                     |
//! | `proxy_rpc_ctxt` | `Delegating <verb> <kind> <path> to http`               |
//!
//! External tooling greps these lines, so their wording is fixed. Every line is
//! produced by rendering a [`TraceEvent`]; nothing else writes to these targets.

pub mod buffer;
pub mod filter;
pub mod layer;

use std::fmt;

use crate::types::{BlockId, ChainId, Verb};

pub use buffer::{TraceBuffer, TraceRecord};
pub use filter::{build_env_filter, selector_directives, SelectorError, FACILITY_SELECTOR_ENV};
pub use layer::TraceBufferLayer;

/// A diagnostic channel, selected independently by log filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    /// Snapshot lifecycle.
    ProxyRpc,
    /// Per-request routing.
    ProxyRpcCtxt,
}

impl Facility {
    pub const ALL: [Facility; 2] = [Facility::ProxyRpc, Facility::ProxyRpcCtxt];

    /// The `tracing` target this facility logs on.
    #[must_use]
    pub fn target(&self) -> &'static str {
        match self {
            Self::ProxyRpc => "proxy_rpc",
            Self::ProxyRpcCtxt => "proxy_rpc_ctxt",
        }
    }

    #[must_use]
    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|facility| facility.target() == target)
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

/// One diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent<'a> {
    /// A context snapshot was constructed for `(chain, block)`.
    CacheCreated { chain: &'a ChainId, block: &'a BlockId },
    /// A request was answered from the replica.
    DoneLocally { verb: Verb, kind: &'a str, path: &'a str },
    /// A request was forwarded to the node.
    Delegating { verb: Verb, kind: &'a str, path: &'a str },
}

impl TraceEvent<'_> {
    #[must_use]
    pub fn facility(&self) -> Facility {
        match self {
            Self::CacheCreated { .. } => Facility::ProxyRpc,
            Self::DoneLocally { .. } | Self::Delegating { .. } => Facility::ProxyRpcCtxt,
        }
    }

    /// The full line, facility prefix included.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{}: {}", self.facility(), self)
    }

    /// Logs the event at debug level on its facility.
    pub fn emit(&self) {
        match self.facility() {
            Facility::ProxyRpc => tracing::debug!(target: "proxy_rpc", "{}", self),
            Facility::ProxyRpcCtxt => tracing::debug!(target: "proxy_rpc_ctxt", "{}", self),
        }
    }
}

impl fmt::Display for TraceEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheCreated { chain, block } => {
                write!(f, "proxy cache created for chain {chain} and block {block}")
            }
            Self::DoneLocally { verb, kind, path } => write!(f, "Done {verb} {kind} {path} locally"),
            Self::Delegating { verb, kind, path } => {
                write!(f, "Delegating {verb} {kind} {path} to http")
            }
        }
    }
}
