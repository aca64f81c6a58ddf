//! Request, path and key types shared by every layer of the proxy.
//!
//! # Path Anatomy
//!
//! ```text
//! /chains/main/blocks/head/helpers/baking_rights?&all=true
//! └──────── SnapshotKey ─┘└────── subpath ─────┘└ query ┘
//! ```
//!
//! Paths outside the `/chains/{chain}/blocks/{block}/` prefix carry no snapshot key and
//! can only ever be delegated.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;

/// Media kind reported in routing trace lines. The proxy only speaks JSON.
pub const MEDIA_KIND_JSON: &str = "json";

/// Opaque chain identifier, e.g. `main`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(Arc<str>);

impl ChainId {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque block identifier as written by the caller: symbolic (`head`, `head~2`) or a hash.
///
/// Two block ids are the same key only if they are the same string; `head` and the hash
/// it currently resolves to are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Arc<str>);

impl BlockId {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identity of one context snapshot: a `(chain, block)` pair compared by exact string
/// equality on both components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub chain: ChainId,
    pub block: BlockId,
}

impl SnapshotKey {
    #[must_use]
    pub fn new(chain: impl Into<ChainId>, block: impl Into<BlockId>) -> Self {
        Self { chain: chain.into(), block: block.into() }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.chain, self.block)
    }
}

/// HTTP verb of an RPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Returns the upper-case wire name, as printed in trace lines.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported RPC verb: {0}")]
pub struct UnknownVerb(pub String);

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(UnknownVerb(s.to_string())),
        }
    }
}

/// Which branch the dispatcher took for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    Local,
    Delegated,
}

impl RoutingDecision {
    /// Returns a static label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Delegated => "delegated",
        }
    }
}

/// Errors raised while parsing an inbound RPC path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("RPC path is empty")]
    Empty,

    #[error("RPC path must start with '/': {0}")]
    NotAbsolute(String),
}

/// Block-scoped part of a [`RequestPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct BlockScope {
    key: SnapshotKey,
    /// Path after the block segment, without leading slash or query.
    subpath: String,
}

/// A parsed RPC path.
///
/// The raw string is kept verbatim (query included) because it is what gets forwarded
/// to the node and what the trace lines must echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    raw: String,
    query_start: Option<usize>,
    block: Option<BlockScope>,
}

impl RequestPath {
    /// Parses a raw RPC path such as `/chains/main/blocks/head/context/constants`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the path is empty or not absolute.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(PathError::NotAbsolute(raw.to_string()));
        }

        let query_start = raw.find('?');
        let path = query_start.map_or(raw, |idx| &raw[..idx]);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let block = match segments.as_slice() {
            ["chains", chain, "blocks", block, rest @ ..] => Some(BlockScope {
                key: SnapshotKey::new(*chain, *block),
                subpath: rest.join("/"),
            }),
            _ => None,
        };

        Ok(Self { raw: raw.to_string(), query_start, block })
    }

    /// The path exactly as received, query included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The path without its query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.query_start.map_or(self.raw.as_str(), |idx| &self.raw[..idx])
    }

    /// The query string without the leading `?`, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query_start.map(|idx| &self.raw[idx + 1..])
    }

    /// Non-empty path segments, query excluded.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path().split('/').filter(|s| !s.is_empty())
    }

    /// The `(chain, block)` key when the path lives under `/chains/{chain}/blocks/{block}`.
    #[must_use]
    pub fn snapshot_key(&self) -> Option<&SnapshotKey> {
        self.block.as_ref().map(|scope| &scope.key)
    }

    /// The block-relative path without query, e.g. `context/constants`.
    #[must_use]
    pub fn subpath(&self) -> Option<&str> {
        self.block.as_ref().map(|scope| scope.subpath.as_str())
    }

    /// The block-relative path with its query re-attached, e.g. `helpers/baking_rights?&all=true`.
    ///
    /// This is the key under which a replicated answer is stored.
    #[must_use]
    pub fn subpath_with_query(&self) -> Option<String> {
        let subpath = self.subpath()?;
        Some(match self.query() {
            Some(query) => format!("{subpath}?{query}"),
            None => subpath.to_string(),
        })
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for RequestPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An inbound RPC call.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub verb: Verb,
    pub path: RequestPath,
    pub body: Option<serde_json::Value>,
}

impl RpcRequest {
    #[must_use]
    pub fn new(verb: Verb, path: RequestPath, body: Option<serde_json::Value>) -> Self {
        Self { verb, path, body }
    }

    /// Builds a `GET` request from a raw path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] if the path cannot be parsed.
    pub fn get(path: &str) -> Result<Self, PathError> {
        Ok(Self::new(Verb::Get, RequestPath::parse(path)?, None))
    }
}
