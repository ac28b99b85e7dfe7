//! Liveness reporting for the gateway process itself

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::gateway::resolver::RoutingConfig;

/// Value of `cache_proxy_url` when the cache tier is bypassed
pub const CACHE_PROXY_DISABLED: &str = "disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
}

/// Health payload served on `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: Status,
    pub cache_proxy_enabled: bool,
    pub cache_proxy_url: String,
    pub timestamp: String,
}

/// Builds health payloads from static routing configuration.
///
/// Never contacts upstreams, so an upstream outage cannot fail the
/// gateway's own health check.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    routing: RoutingConfig,
}

impl HealthReporter {
    pub fn new(routing: RoutingConfig) -> Self {
        Self { routing }
    }

    pub fn report(&self) -> HealthStatus {
        let cache_proxy_url = if self.routing.cache_proxy_enabled {
            self.routing.cache_proxy_url.as_str().trim_end_matches('/').to_string()
        } else {
            CACHE_PROXY_DISABLED.to_string()
        };

        HealthStatus {
            status: Status::Up,
            cache_proxy_enabled: self.routing.cache_proxy_enabled,
            cache_proxy_url,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
