pub mod dispatcher;
pub mod errors;

pub use dispatcher::{DispatcherSettings, ProxyDispatcher, RequestState};
pub use errors::ProxyError;
