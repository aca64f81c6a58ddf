//! HTTP front end of the context proxy.
//!
//! Serves the node's RPC path space: every path not claimed by the operational endpoints
//! (`/health`, `/metrics`, `/debug/traces`) is handed to the
//! [`ProxyDispatcher`](ctxproxy_core::proxy::ProxyDispatcher), which answers it from the
//! local context replica or delegates it to the node.

pub mod middleware;
pub mod router;
