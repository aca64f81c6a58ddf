use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{
    types::{ChainId, Verb},
    upstream::{
        http_client::{HttpClient, HttpClientConfig},
        UpstreamError,
    },
};

/// Performs round trips to the node.
///
/// `call` forwards an arbitrary RPC path verbatim. `fetch` reads a block-relative path
/// and is what replica construction is built on. Implementations must not retry.
#[async_trait]
pub trait RemoteDelegate: Send + Sync {
    /// Forwards `verb path` with an optional JSON body and returns the decoded JSON answer.
    async fn call(
        &self,
        verb: Verb,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError>;

    /// Reads `subpath` under `/chains/{chain}/blocks/{block}`.
    async fn fetch(
        &self,
        chain: &ChainId,
        block: &str,
        subpath: &str,
    ) -> Result<Value, UpstreamError> {
        self.call(Verb::Get, &block_path(chain, block, subpath), None).await
    }
}

/// Builds `/chains/{chain}/blocks/{block}[/subpath]`.
///
/// A subpath that is only a query (`?x=1`) is attached without a separator.
#[must_use]
pub fn block_path(chain: &ChainId, block: &str, subpath: &str) -> String {
    let subpath = subpath.trim_start_matches('/');
    if subpath.is_empty() {
        format!("/chains/{chain}/blocks/{block}")
    } else if subpath.starts_with('?') {
        format!("/chains/{chain}/blocks/{block}{subpath}")
    } else {
        format!("/chains/{chain}/blocks/{block}/{subpath}")
    }
}

/// [`RemoteDelegate`] speaking the node's HTTP RPC interface.
pub struct HttpDelegate {
    endpoint: Url,
    client: HttpClient,
    timeout: Duration,
}

impl HttpDelegate {
    /// Creates a delegate for the node at `endpoint` (e.g. `http://127.0.0.1:8732`).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidEndpoint`] if `endpoint` is not an http(s) URL, or
    /// a connection error if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        client_config: HttpClientConfig,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| UpstreamError::InvalidEndpoint(e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(UpstreamError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }

        Ok(Self { endpoint, client: HttpClient::with_config(client_config)?, timeout })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RemoteDelegate for HttpDelegate {
    async fn call(
        &self,
        verb: Verb,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let url = self.url_for(path);
        let bytes = self.client.send(verb, &url, body, self.timeout).await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(path = path, error = %e, "node answered with malformed JSON");
            UpstreamError::InvalidResponse(e.to_string())
        })
    }
}
