//! Request duration instrumentation middleware

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::debug;

use crate::gateway::route::{RouteTable, RESERVED_PATHS};
use crate::metrics::{Metrics, RequestObservation, UNMATCHED_ROUTE};

/// Status recorded when the response never completed (client went away).
/// Same convention as nginx's "client closed request".
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Label a request path for metrics: the owning route prefix, a gateway
/// endpoint, or the catch-all label.
pub fn route_label(routes: &RouteTable, path: &str) -> String {
    if let Some(route) = routes.match_path(path) {
        return route.prefix().to_string();
    }
    match RESERVED_PATHS.iter().find(|reserved| **reserved == path) {
        Some(reserved) => reserved.to_string(),
        None => UNMATCHED_ROUTE.to_string(),
    }
}

/// Pending observation for one request.
///
/// Records exactly once: on [`ObservationGuard::finish`], or on drop if the
/// request future was cancelled first.
pub struct ObservationGuard {
    metrics: Metrics,
    method: String,
    route: String,
    started: Instant,
    recorded: bool,
}

impl ObservationGuard {
    pub fn start(metrics: Metrics, method: String, route: String) -> Self {
        Self {
            metrics,
            method,
            route,
            started: Instant::now(),
            recorded: false,
        }
    }

    pub fn finish(mut self, status: StatusCode) {
        self.record(status.as_u16());
    }

    fn record(&mut self, status: u16) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        let observation = RequestObservation {
            method: std::mem::take(&mut self.method),
            route: std::mem::take(&mut self.route),
            status,
            duration: self.started.elapsed(),
        };
        debug!(
            method = %observation.method,
            route = %observation.route,
            status = observation.status,
            duration_ms = observation.duration.as_millis() as u64,
            "Request observed"
        );
        self.metrics.observe(&observation);
    }
}

impl Drop for ObservationGuard {
    fn drop(&mut self) {
        self.record(CLIENT_CLOSED_REQUEST);
    }
}

/// Instrumentation layer
#[derive(Clone)]
pub struct InstrumentationLayer {
    metrics: Metrics,
    routes: Arc<RouteTable>,
}

impl InstrumentationLayer {
    pub fn new(metrics: Metrics, routes: Arc<RouteTable>) -> Self {
        Self { metrics, routes }
    }
}

impl<S> Layer<S> for InstrumentationLayer {
    type Service = InstrumentationMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentationMiddleware {
            inner,
            metrics: self.metrics.clone(),
            routes: self.routes.clone(),
        }
    }
}

/// Instrumentation middleware service
#[derive(Clone)]
pub struct InstrumentationMiddleware<S> {
    inner: S,
    metrics: Metrics,
    routes: Arc<RouteTable>,
}

impl<S> Service<Request<Body>> for InstrumentationMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let guard = ObservationGuard::start(
            self.metrics.clone(),
            request.method().to_string(),
            route_label(&self.routes, request.uri().path()),
        );

        let future = self.inner.call(request);
        Box::pin(async move {
            match future.await {
                Ok(response) => {
                    guard.finish(response.status());
                    Ok(response)
                }
                Err(err) => {
                    guard.finish(StatusCode::INTERNAL_SERVER_ERROR);
                    Err(err)
                }
            }
        })
    }
}
