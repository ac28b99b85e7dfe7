//! Upstream resolution between direct services and the shared cache tier

use reqwest::Url;

use crate::gateway::route::Route;

/// Cache-tier routing, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub cache_proxy_url: Url,
    pub cache_proxy_enabled: bool,
}

/// Pick the base URL a route forwards to.
///
/// With the cache tier enabled every route goes through `cache_proxy_url`;
/// otherwise each route uses its own default upstream.
pub fn resolve<'a>(route: &'a Route, routing: &'a RoutingConfig) -> &'a Url {
    if routing.cache_proxy_enabled {
        &routing.cache_proxy_url
    } else {
        route.default_upstream()
    }
}

/// Join a base URL with the original request path and query.
///
/// The full path, prefix included, is preserved.
pub fn upstream_url(base: &Url, path_and_query: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{}{}", base, path_and_query)
    } else {
        format!("{}/{}", base, path_and_query)
    }
}
