use crate::{
    cache::StoreError,
    types::{PathError, SnapshotKey, UnknownVerb},
    upstream::{FetchErrorKind, UpstreamError},
};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Preserves the concrete `UpstreamError` so callers can relay the node's status.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// A local subpath is absent from the replica and the miss policy forbids extending it.
    #[error("Not found: {subpath} in the context of chain {} and block {}", .key.chain, .key.block)]
    NotFound { key: SnapshotKey, subpath: String },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Network or protocol class of an upstream failure, if this is one.
    #[must_use]
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Upstream(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<StoreError> for ProxyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Miss { key, subpath } => Self::NotFound { key, subpath },
            other => Self::Store(other),
        }
    }
}

impl From<PathError> for ProxyError {
    fn from(err: PathError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<UnknownVerb> for ProxyError {
    fn from(err: UnknownVerb) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
