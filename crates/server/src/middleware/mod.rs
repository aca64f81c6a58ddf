//! HTTP middleware for the RPC front end.

pub mod request_id;

pub use request_id::{
    create_request_id_layers, create_trace_layer, RpcSpan, UuidRequestIdGenerator, X_REQUEST_ID,
};
