//! Edge Gateway
//!
//! Routes traffic for the banking backend services (account, transaction,
//! auth, notification, fraud), optionally through a shared cache tier, and
//! records request duration for every request it handles.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod middleware;

pub use error::{AppError, Result};

use std::sync::Arc;

use gateway::{HealthReporter, ProxyRouter, RouteTable, RoutingConfig};
use metrics::Metrics;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub routes: Arc<RouteTable>,
    pub routing: RoutingConfig,
    pub metrics: Metrics,
    pub proxy: Arc<ProxyRouter>,
    pub health: HealthReporter,
}

impl AppState {
    /// Build the immutable gateway state from validated settings
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        settings.validate()?;

        let routes = Arc::new(settings.route_table()?);
        let routing = settings.routing_config()?;
        let metrics = Metrics::new()?;
        let proxy = Arc::new(ProxyRouter::new(
            routes.clone(),
            routing.clone(),
            metrics.clone(),
            settings.proxy.max_body_bytes,
        )?);
        let health = HealthReporter::new(routing.clone());

        Ok(Self {
            settings: Arc::new(settings),
            routes,
            routing,
            metrics,
            proxy,
            health,
        })
    }
}
