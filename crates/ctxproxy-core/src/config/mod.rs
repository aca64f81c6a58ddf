//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and serde defaults
//! 2. **Config file**: TOML file named by the `CTXPROXY_CONFIG` env var
//!    (`config/config.toml` when unset, optional)
//! 3. **Environment variables**: `CTXPROXY__SECTION__FIELD` overrides
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP front end (bind address, concurrency, timeout)
//! - [`NodeConfig`]: the node requests are delegated to
//! - [`CacheConfig`]: replica miss policy and prefetched subpaths
//! - [`RoutingConfig`]: extra local / remote route patterns
//! - [`LoggingConfig`]: log level, format and facility selector
//! - [`MetricsConfig`]: Prometheus endpoint
//!
//! # Example
//!
//! ```toml
//! [node]
//! endpoint = "http://127.0.0.1:8732"
//!
//! [cache]
//! miss_policy = "extend"
//! prefetch = ["context/constants"]
//!
//! [routing]
//! remote = ["/chains/*/blocks/*/context/raw/**"]
//!
//! [logging]
//! facilities = "proxy_rpc->debug;proxy_rpc_ctxt->debug"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};

use crate::{
    cache::MissPolicy,
    diagnostics::selector_directives,
    routing::{RoutingError, RoutingTable},
    upstream::HttpClientConfig,
};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CTXPROXY_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `18732`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of requests processed concurrently. Defaults to `100`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    18732
}

fn default_max_concurrent_requests() -> usize {
    100
}

fn default_request_timeout_seconds() -> u64 {
    30
}

/// The node behind the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Base URL of the node's RPC interface. Defaults to `http://127.0.0.1:8732`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Maximum number of in-flight requests to the node. Defaults to `64`.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    /// How long a request may wait for a free slot, in milliseconds. Defaults to `5000`.
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,

    /// TCP connect timeout in milliseconds. Defaults to `5000`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8732".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_concurrent_limit() -> usize {
    64
}

fn default_permit_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl NodeConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    #[must_use]
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            concurrent_limit: self.concurrent_limit,
            permit_timeout_ms: self.permit_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

/// Context replica settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// What a local request does when its subpath is not replicated. Defaults to `extend`.
    #[serde(default)]
    pub miss_policy: MissPolicy,

    /// Block-relative subpaths fetched when a snapshot is created.
    /// Defaults to `["context/constants"]`.
    #[serde(default = "default_prefetch")]
    pub prefetch: Vec<String>,
}

fn default_prefetch() -> Vec<String> {
    vec!["context/constants".to_string()]
}

/// Route patterns consulted before the built-in table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Extra locally answerable patterns, rooted at `/chains/*/blocks/*/`.
    #[serde(default)]
    pub local: Vec<String>,

    /// Extra always-delegated patterns.
    #[serde(default)]
    pub remote: Vec<String>,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level or `EnvFilter` directives. Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"`, `"pretty"` or `"compact"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Facility selector, e.g. `proxy_rpc->debug`. `CTXPROXY_LOG` takes precedence.
    #[serde(default)]
    pub facilities: Option<String>,

    /// Number of facility lines kept for `/debug/traces`. Defaults to `1000`.
    #[serde(default = "default_trace_buffer_size")]
    pub trace_buffer_size: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_trace_buffer_size() -> usize {
    1000
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether `/metrics` is served. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout_seconds(),
            concurrent_limit: default_concurrent_limit(),
            permit_timeout_ms: default_permit_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { miss_policy: MissPolicy::default(), prefetch: default_prefetch() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            facilities: None,
            trace_buffer_size: default_trace_buffer_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Use `__` as a separator for nested fields (e.g. `CTXPROXY__NODE__ENDPOINT=...`).
    /// List fields accept comma separated values
    /// (e.g. `CTXPROXY__CACHE__PREFETCH=context/constants,votes/listings`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", default_bind_address())?
            .set_default("server.bind_port", i64::from(default_bind_port()))?
            .set_default("node.endpoint", default_endpoint())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("CTXPROXY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cache.prefetch")
                    .with_list_parse_key("routing.local")
                    .with_list_parse_key("routing.remote"),
            )
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `CTXPROXY_CONFIG` environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Builds the routing table: configured patterns first, then the built-in rules.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] for an invalid or non block-scoped local pattern.
    pub fn routing_table(&self) -> Result<RoutingTable, RoutingError> {
        RoutingTable::with_overrides(&self.routing.local, &self.routing.remote)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.server.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        match url::Url::parse(&self.node.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(format!("Invalid node endpoint: {}", self.node.endpoint)),
        }

        if self.node.timeout_seconds == 0 {
            return Err("Node timeout must be greater than 0".to_string());
        }

        if self.node.concurrent_limit == 0 {
            return Err("Node concurrent limit must be greater than 0".to_string());
        }

        let mut seen = HashSet::new();
        for subpath in &self.cache.prefetch {
            if subpath.trim_matches('/').is_empty() {
                return Err("Prefetch subpaths must not be empty".to_string());
            }
            if subpath.starts_with('/') {
                return Err(format!("Prefetch subpath must be block-relative: {subpath}"));
            }
            if !seen.insert(subpath.as_str()) {
                return Err(format!("Duplicate prefetch subpath: {subpath}"));
            }
        }

        self.routing_table().map_err(|e| e.to_string())?;

        if !["json", "pretty", "compact"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json', 'pretty' or 'compact'".to_string());
        }

        if let Some(selector) = &self.logging.facilities {
            selector_directives(selector).map_err(|e| e.to_string())?;
        }

        if self.logging.trace_buffer_size == 0 {
            return Err("Trace buffer size must be greater than 0".to_string());
        }

        Ok(())
    }
}
