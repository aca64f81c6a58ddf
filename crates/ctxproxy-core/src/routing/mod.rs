//! Path classification.
//!
//! The classifier is a plain, ordered rule table. Each rule pairs a path pattern with a
//! [`Route`]; the first matching rule decides, and a path no rule matches is
//! [`Route::RemoteOnly`]. Classification never fails.
//!
//! Pattern syntax, segment by segment:
//!
//! | segment   | matches                                     |
//! |-----------|---------------------------------------------|
//! | `literal` | exactly that segment                        |
//! | `*`       | any single segment                          |
//! | `**`      | one or more trailing segments (last only)   |

use std::fmt;
use thiserror::Error;

use crate::types::{RequestPath, Verb};

/// Block-scoped paths answerable from a context replica.
pub const DEFAULT_LOCAL_ROUTES: &[&str] = &[
    "/chains/*/blocks/*/context/**",
    "/chains/*/blocks/*/helpers/baking_rights",
    "/chains/*/blocks/*/helpers/current_level",
    "/chains/*/blocks/*/minimal_valid_time",
    "/chains/*/blocks/*/helpers/endorsing_rights",
    "/chains/*/blocks/*/helpers/levels_in_current_cycle",
    "/chains/*/blocks/*/votes/**",
];

/// Paths that are always forwarded, listed explicitly so they can never be shadowed by
/// a broader default.
pub const DEFAULT_REMOTE_ROUTES: &[&str] = &[
    "/chains/*/blocks",
    "/network/**",
    "/monitor/**",
    "/injection/**",
    "/workers/**",
    "/chains/*/mempool/**",
];

/// Outcome of classifying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Servable from the context replica of the path's `(chain, block)`.
    Local,
    /// Must always be forwarded to the node.
    RemoteOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("local route pattern '{0}' must be rooted at /chains/*/blocks/*/")]
    LocalNotBlockScoped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(Box<str>),
    Any,
    Rest,
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compiles a pattern such as `/chains/*/blocks/*/votes/**`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InvalidPattern`] if the pattern is not absolute, has an
    /// empty segment, or uses `**` anywhere but last.
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        let invalid = |reason| RoutingError::InvalidPattern { pattern: pattern.to_string(), reason };

        let Some(body) = pattern.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        if body.contains('?') {
            return Err(invalid("must not contain a query"));
        }

        let raw: Vec<&str> = if body.is_empty() { Vec::new() } else { body.split('/').collect() };
        let mut segments = Vec::with_capacity(raw.len());
        for (idx, segment) in raw.iter().enumerate() {
            let compiled = match *segment {
                "" => return Err(invalid("empty segment")),
                "*" => Segment::Any,
                "**" if idx + 1 == raw.len() => Segment::Rest,
                "**" => return Err(invalid("'**' is only allowed as the last segment")),
                literal => Segment::Literal(literal.into()),
            };
            segments.push(compiled);
        }

        Ok(Self { source: pattern.to_string(), segments })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern can only match paths under `/chains/{chain}/blocks/{block}/`.
    #[must_use]
    pub fn is_block_scoped(&self) -> bool {
        let literal = |segment: &Segment, expected: &str| {
            matches!(segment, Segment::Literal(value) if &**value == expected)
        };
        let single = |segment: &Segment| matches!(segment, Segment::Any | Segment::Literal(_));

        match self.segments.as_slice() {
            [chains, chain, blocks, block, _, ..] => {
                literal(chains, "chains") && single(chain) && literal(blocks, "blocks") && single(block)
            }
            _ => false,
        }
    }

    /// Matches the query-free path segments.
    #[must_use]
    pub fn matches<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> bool {
        let mut path = segments.into_iter();
        for expected in &self.segments {
            match expected {
                Segment::Rest => return path.next().is_some(),
                Segment::Any => {
                    if path.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(value) => {
                    if path.next() != Some(&**value) {
                        return false;
                    }
                }
            }
        }
        path.next().is_none()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One entry of the [`RoutingTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub route: Route,
}

impl RouteRule {
    /// Compiles a rule, rejecting local rules that could match a path without a
    /// snapshot key.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] if the pattern is invalid or, for [`Route::Local`], not
    /// block scoped.
    pub fn new(pattern: &str, route: Route) -> Result<Self, RoutingError> {
        let pattern = RoutePattern::parse(pattern)?;
        if route == Route::Local && !pattern.is_block_scoped() {
            return Err(RoutingError::LocalNotBlockScoped(pattern.source));
        }
        Ok(Self { pattern, route })
    }
}

/// Ordered, first-match-wins rule table.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<RouteRule>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self { rules: default_rules() }
    }
}

fn default_rules() -> Vec<RouteRule> {
    // The built-in patterns are constants and known to compile.
    DEFAULT_LOCAL_ROUTES
        .iter()
        .map(|p| (p, Route::Local))
        .chain(DEFAULT_REMOTE_ROUTES.iter().map(|p| (p, Route::RemoteOnly)))
        .filter_map(|(pattern, route)| RouteRule::new(pattern, route).ok())
        .collect()
}

impl RoutingTable {
    /// Builds a table from explicit rules, without the defaults.
    #[must_use]
    pub fn from_rules(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// Builds the default table with extra rules consulted first.
    ///
    /// Extra local rules precede extra remote rules.
    ///
    /// # Errors
    ///
    /// Returns the first [`RoutingError`] among the extra patterns.
    pub fn with_overrides(local: &[String], remote: &[String]) -> Result<Self, RoutingError> {
        let mut rules = Vec::with_capacity(local.len() + remote.len());
        for pattern in local {
            rules.push(RouteRule::new(pattern, Route::Local)?);
        }
        for pattern in remote {
            rules.push(RouteRule::new(pattern, Route::RemoteOnly)?);
        }
        rules.extend(default_rules());
        Ok(Self { rules })
    }

    /// Classifies a request.
    ///
    /// Only `GET` requests with a snapshot key can be local; everything else is
    /// [`Route::RemoteOnly`].
    #[must_use]
    pub fn classify(&self, verb: Verb, path: &RequestPath) -> Route {
        if verb != Verb::Get || path.snapshot_key().is_none() {
            return Route::RemoteOnly;
        }
        self.classify_path(path)
    }

    /// Classifies a path by shape alone, ignoring the verb.
    #[must_use]
    pub fn classify_path(&self, path: &RequestPath) -> Route {
        let route = self
            .rules
            .iter()
            .find(|rule| rule.pattern.matches(path.segments()))
            .map_or(Route::RemoteOnly, |rule| rule.route);

        if route == Route::Local && path.snapshot_key().is_none() {
            return Route::RemoteOnly;
        }
        route
    }

    #[must_use]
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}
