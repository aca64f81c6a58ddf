pub mod delegate;
pub mod errors;
pub mod http_client;

pub use delegate::{block_path, HttpDelegate, RemoteDelegate};
pub use errors::{FetchErrorKind, UpstreamError};
pub use http_client::{HttpClient, HttpClientConfig};
