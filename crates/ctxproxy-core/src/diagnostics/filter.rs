//! Facility selector.
//!
//! Besides `RUST_LOG`, facilities can be switched on with a selector in
//! [`FACILITY_SELECTOR_ENV`]: `facility->level` items separated by `,` or `;`, e.g.
//! `proxy_rpc->debug; proxy_rpc_ctxt->debug`. A `*` facility sets the default level.
//! Level names `notice`, `warning` and `fatal` are accepted as aliases of `info`,
//! `warn` and `error`.

use thiserror::Error;
use tracing_subscriber::{filter::ParseError, EnvFilter};

/// Environment variable holding the facility selector.
pub const FACILITY_SELECTOR_ENV: &str = "CTXPROXY_LOG";

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("selector item '{0}' is not of the form facility->level")]
    MalformedItem(String),

    #[error("unknown log level '{level}' for facility '{facility}'")]
    UnknownLevel { facility: String, level: String },

    #[error("invalid filter directive: {0}")]
    Directive(#[from] ParseError),
}

fn level_name(level: &str) -> Option<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" | "notice" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "fatal" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

/// Translates a selector into `EnvFilter` directives.
///
/// # Errors
///
/// Returns [`SelectorError`] on a malformed item or an unknown level.
pub fn selector_directives(selector: &str) -> Result<Vec<String>, SelectorError> {
    selector
        .split([',', ';'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (facility, level) = item
                .split_once("->")
                .or_else(|| item.split_once('='))
                .ok_or_else(|| SelectorError::MalformedItem(item.to_string()))?;
            let (facility, level) = (facility.trim(), level.trim());
            if facility.is_empty() {
                return Err(SelectorError::MalformedItem(item.to_string()));
            }

            let level = level_name(level).ok_or_else(|| SelectorError::UnknownLevel {
                facility: facility.to_string(),
                level: level.to_string(),
            })?;

            Ok(if facility == "*" { level.to_string() } else { format!("{facility}={level}") })
        })
        .collect()
}

/// Builds an `EnvFilter` from `base` directives plus an optional facility selector.
///
/// Selector directives are added after `base`, so they win for their targets.
///
/// # Errors
///
/// Returns [`SelectorError`] if `base` or the selector cannot be parsed.
pub fn build_env_filter(base: &str, selector: Option<&str>) -> Result<EnvFilter, SelectorError> {
    let mut filter = EnvFilter::try_new(base)?;
    if let Some(selector) = selector {
        for directive in selector_directives(selector)? {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    Ok(filter)
}
