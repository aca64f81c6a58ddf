use thiserror::Error;

/// Coarse classification of a failed node round trip.
///
/// - `Network`: the node could not be reached or did not answer in time.
/// - `Protocol`: the node answered, but with a non-success status or a body that is not
///   JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Network,
    Protocol,
}

impl FetchErrorKind {
    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
        }
    }
}

/// Errors that can occur when talking to the node.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the configured timeout duration.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the node.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The node answered with a non-2xx status.
    ///
    /// First field is the HTTP status code, second is the (truncated) response body.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be parsed as JSON or had an unexpected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Maximum concurrent requests limit has been reached.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),

    /// The configured node endpoint is not a usable URL.
    #[error("Invalid node endpoint: {0}")]
    InvalidEndpoint(String),
}

impl UpstreamError {
    /// Classifies the error as a network or a protocol failure.
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::HttpError(_, _) | Self::InvalidResponse(_) => FetchErrorKind::Protocol,
            Self::Timeout |
            Self::ConnectionFailed(_) |
            Self::Network(_) |
            Self::ConcurrencyLimit(_) |
            Self::InvalidEndpoint(_) => FetchErrorKind::Network,
        }
    }

    /// HTTP status the node answered with, if it answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError(status, _) => Some(*status),
            _ => None,
        }
    }
}
