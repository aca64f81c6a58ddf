//! Mock Infrastructure for Testing the Context Proxy
//!
//! Reusable node mocks and helpers, so tests run without a real node.
//!
//! ## Components
//!
//! - `NodeMockBuilder`: wraps mockito to serve the node's RPC path space
//! - Test helpers: dispatcher wiring, facility line capture and fixtures
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{test_dispatcher, NodeMockBuilder, HEAD_HASH};
//!
//! let mut node = NodeMockBuilder::new().await;
//! node.mock_block_hash("main", "head", HEAD_HASH);
//!
//! let dispatcher = test_dispatcher(&node.url(), DispatcherSettings::default());
//! ```

pub mod node_mock;
pub mod test_helpers;

pub use node_mock::NodeMockBuilder;
pub use test_helpers::*;
