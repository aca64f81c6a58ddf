//! Node Mock Builder
//!
//! Wraps mockito to serve the node's RPC path space: block hash resolution, block-context
//! subpaths and plain pass-through paths.

use mockito::{Mock, Server, ServerGuard};
use serde_json::Value;

/// Builder for a mock node.
///
/// Mocks stay registered for the lifetime of the builder. Only mocks created with an
/// explicit hit count are checked by [`assert_all`](Self::assert_all).
pub struct NodeMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
    counted: Vec<Mock>,
}

impl NodeMockBuilder {
    /// Creates a new node mock with a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new(), counted: Vec::new() }
    }

    /// Returns the URL of the mock node.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Mocks `GET /chains/{chain}/blocks/{block}/hash`, expected exactly once.
    pub fn mock_block_hash(&mut self, chain: &str, block: &str, hash: &str) -> &mut Self {
        self.mock_get_times(
            &format!("/chains/{chain}/blocks/{block}/hash"),
            &Value::String(hash.to_string()),
            1,
        )
    }

    /// Mocks a block-context subpath pinned to a resolved hash.
    pub fn mock_context(
        &mut self,
        chain: &str,
        hash: &str,
        subpath: &str,
        value: &Value,
    ) -> &mut Self {
        self.mock_get(&format!("/chains/{chain}/blocks/{hash}/{subpath}"), value)
    }

    /// Mocks `GET path` with any number of hits.
    pub fn mock_get(&mut self, path: &str, value: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks `GET path`, expected exactly `hits` times.
    pub fn mock_get_times(&mut self, path: &str, value: &Value, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
            .expect(hits)
            .create();

        self.counted.push(mock);
        self
    }

    /// Mocks `verb path` answering with a JSON body.
    pub fn mock_call(&mut self, verb: &str, path: &str, response: &Value) -> &mut Self {
        let mock = self
            .server
            .mock(verb, path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response.to_string())
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks `GET path` answering with a non-success status.
    pub fn mock_error(&mut self, path: &str, status: usize, body: &str) -> &mut Self {
        let mock = self.server.mock("GET", path).with_status(status).with_body(body).create();

        self.mocks.push(mock);
        self
    }

    /// Mocks `GET path` answering 200 with a raw, possibly non-JSON, body.
    pub fn mock_raw(&mut self, path: &str, body: &str) -> &mut Self {
        let mock = self.server.mock("GET", path).with_status(200).with_body(body).create();

        self.mocks.push(mock);
        self
    }

    /// Drops every registered mock.
    pub fn reset(&mut self) -> &mut Self {
        self.mocks.clear();
        self.counted.clear();
        self.server.reset();
        self
    }

    /// Asserts the hit expectations of every registered mock.
    pub async fn assert_all(&self) {
        for mock in &self.counted {
            mock.assert_async().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_node_mock_serves_block_hash() {
        let mut node = NodeMockBuilder::new().await;
        node.mock_block_hash("main", "head", "BLockHead");

        let body = reqwest::get(format!("{}/chains/main/blocks/head/hash", node.url()))
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap();

        assert_eq!(body, json!("BLockHead"));
        node.assert_all().await;
    }
}
