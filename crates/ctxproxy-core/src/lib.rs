//! # ctxproxy core
//!
//! Core library of the proxy-mode RPC client. A proxy sits between an RPC caller and a
//! node and answers the requests it can from a local, lazily materialized replica of a
//! block's context instead of paying a network round trip for each of them.
//!
//! - **[`routing`]**: the data-driven rule table deciding whether a path is answerable
//!   locally or must always be delegated to the node.
//! - **[`cache`]**: the context snapshot store, one snapshot per `(chain, block)` pair,
//!   created at most once per process.
//! - **[`upstream`]**: the HTTP delegate talking to the node.
//! - **[`proxy`]**: the dispatcher tying routing, replica and delegate together.
//! - **[`diagnostics`]**: the trace lines emitted on the `proxy_rpc` and
//!   `proxy_rpc_ctxt` facilities, and a capture layer for them.
//! - **[`config`]**: layered configuration (defaults, TOML file, environment).
//! - **[`metrics`]**: Prometheus counters for routing decisions and replica lifecycle.
//!
//! ## Request Flow
//!
//! ```text
//! RpcRequest
//!     │
//!     ▼
//! ┌───────────────┐
//! │ RoutingTable  │ ─── RemoteOnly ──► RemoteDelegate ──► "Delegating … to http"
//! └──────┬────────┘
//!        │ Local
//!        ▼
//! ┌───────────────┐   first request for (chain, block)
//! │ SnapshotStore │ ──────────────────────────────────► "proxy cache created for …"
//! └──────┬────────┘
//!        │
//!        ▼
//!  ContextSnapshot::read ──► "Done … locally"
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod metrics;
pub mod proxy;
pub mod routing;
pub mod types;
pub mod upstream;
