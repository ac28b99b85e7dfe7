//! Gateway module - Route table, upstream resolution, proxying and health

pub mod health;
pub mod proxy;
pub mod resolver;
pub mod route;

pub use health::{HealthReporter, HealthStatus};
pub use proxy::ProxyRouter;
pub use resolver::{resolve, RoutingConfig};
pub use route::{Route, RouteTable};
