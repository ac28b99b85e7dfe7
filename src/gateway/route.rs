//! Static route table mapping path prefixes to upstream services

use reqwest::Url;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Paths served by the gateway itself; no route may shadow them
pub const RESERVED_PATHS: [&str; 2] = ["/metrics", "/health"];

/// A proxied path prefix and its default upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    prefix: String,
    default_upstream: Url,
    timeout_ms: u64,
}

impl Route {
    pub fn new(prefix: impl Into<String>, default_upstream: Url, timeout_ms: u64) -> Self {
        Self {
            prefix: prefix.into(),
            default_upstream,
            timeout_ms,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_upstream(&self) -> &Url {
        &self.default_upstream
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether the prefix covers `path` on a segment boundary.
    ///
    /// `/accounts` matches `/accounts` and `/accounts/ACC1` but not `/accountsX`.
    pub fn matches(&self, path: &str) -> bool {
        segment_prefix(&self.prefix, path)
    }
}

fn segment_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Ordered, immutable set of routes with mutually exclusive prefixes
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a route table, rejecting prefixes that could overlap
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        for (i, route) in routes.iter().enumerate() {
            let prefix = route.prefix();
            if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
                return Err(invalid_route(format!(
                    "Route prefix '{}' must start with '/' and name a path segment",
                    prefix
                )));
            }

            if RESERVED_PATHS.iter().any(|reserved| segment_prefix(prefix, reserved)) {
                return Err(invalid_route(format!(
                    "Route prefix '{}' shadows a gateway endpoint",
                    prefix
                )));
            }

            for other in routes.iter().skip(i + 1) {
                if route.matches(other.prefix()) || other.matches(prefix) {
                    return Err(invalid_route(format!(
                        "Route prefixes '{}' and '{}' overlap",
                        prefix,
                        other.prefix()
                    )));
                }
            }
        }

        Ok(Self { routes })
    }

    /// First route whose prefix covers the path
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn invalid_route(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}
