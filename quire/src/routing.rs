//! Routing collaborators consumed by the template helpers.
//!
//! Route dispatch itself belongs to axum; this module only covers the two
//! questions templates ask: "what is the path of this named route" and
//! "does this unit select its variant".

use std::collections::HashMap;

use minijinja::Value;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Everything outside the RFC 3986 unreserved set is encoded in a segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Reverse-URL failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// No route registered under this name
    #[error("no route named `{0}`")]
    UnknownRoute(String),

    /// Parameter count does not match the route pattern
    #[error("route `{name}` expects {expected} parameter(s), got {actual}")]
    ParamCount {
        /// Route name
        name: String,
        /// Placeholders in the pattern
        expected: usize,
        /// Parameters supplied
        actual: usize,
    },
}

/// Turns a route name plus positional parameters into a path.
///
/// The returned path is emitted into templates without HTML escaping, so
/// implementations must encode the parameters they splice in.
pub trait ReverseRouter: Send + Sync {
    /// Build the path for `name`.
    fn reverse(&self, name: &str, params: &[String]) -> Result<String, RouteError>;
}

/// Decides whether a unit discriminator selects its variant partial.
pub trait VariantSelector: Send + Sync {
    /// `true` selects the primary partial, `false` the fallback.
    fn select(&self, unit: &Value) -> bool;
}

/// Selects the variant whenever the unit value is truthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruthyVariant;

impl VariantSelector for TruthyVariant {
    fn select(&self, unit: &Value) -> bool {
        unit.is_true()
    }
}

/// Named path patterns using axum's `{param}` placeholder syntax.
///
/// ```rust
/// use quire::routing::{ReverseRouter, RouteTable};
///
/// let routes = RouteTable::new().with_route("user", "/users/{id}");
/// assert_eq!(routes.reverse("user", &["42".to_string()]).unwrap(), "/users/42");
/// assert_eq!(routes.reverse("user", &["a/b".to_string()]).unwrap(), "/users/a%2Fb");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route pattern under `name`
    #[must_use]
    pub fn with_route(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.routes.insert(name.into(), pattern.into());
        self
    }

    /// Pattern registered under `name`
    pub fn pattern(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(String::as_str)
    }
}

fn is_placeholder(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

impl ReverseRouter for RouteTable {
    fn reverse(&self, name: &str, params: &[String]) -> Result<String, RouteError> {
        let pattern = self
            .routes
            .get(name)
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))?;

        let expected = pattern.split('/').filter(|s| is_placeholder(s)).count();
        if expected != params.len() {
            return Err(RouteError::ParamCount {
                name: name.to_string(),
                expected,
                actual: params.len(),
            });
        }

        let mut params = params.iter();
        let path = pattern
            .split('/')
            .map(|segment| {
                if is_placeholder(segment) {
                    if let Some(param) = params.next() {
                        return utf8_percent_encode(param, SEGMENT).to_string();
                    }
                }
                segment.to_string()
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(path)
    }
}
