//! Request correlation for the RPC front end.
//!
//! Every inbound request carries an `x-request-id`, generated when the client sent none.
//! The id is echoed on the response and recorded on the request span, so the facility
//! lines of one request can be tied back to it.

use axum::http::{header::HeaderValue, HeaderName, Request};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultOnResponse, HttpMakeClassifier, MakeSpan, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

/// The header name for request correlation IDs.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// A UUID v4 generator for request IDs.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestIdGenerator;

impl MakeRequestId for UuidRequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).ok()?))
    }
}

/// Opens one `rpc` span per request, tagged with verb, path and request id.
#[derive(Clone, Copy, Default)]
pub struct RpcSpan;

impl<B> MakeSpan<B> for RpcSpan {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let request_id = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");

        tracing::debug_span!(
            "rpc",
            verb = %request.method(),
            path = %request.uri(),
            request_id
        )
    }
}

/// Creates the request ID layer pair.
///
/// Apply `propagate` before `set` so that `set` runs first on the way in:
///
/// ```ignore
/// let (set_layer, propagate_layer) = create_request_id_layers();
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(propagate_layer)
///     .layer(set_layer);
/// ```
#[must_use]
pub fn create_request_id_layers(
) -> (SetRequestIdLayer<UuidRequestIdGenerator>, PropagateRequestIdLayer) {
    let set_layer = SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestIdGenerator);
    let propagate_layer = PropagateRequestIdLayer::new(X_REQUEST_ID.clone());

    (set_layer, propagate_layer)
}

/// HTTP trace layer using [`RpcSpan`]; responses are logged at `debug`.
#[must_use]
pub fn create_trace_layer() -> TraceLayer<HttpMakeClassifier, RpcSpan> {
    TraceLayer::new_for_http()
        .make_span_with(RpcSpan)
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
}
