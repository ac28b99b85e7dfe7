//! Router construction and middleware ordering

use axum::{body::Body, http::Request, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::api::handlers;
use crate::middleware::{fallback::catch_panic_layer, instrumentation::InstrumentationLayer};
use crate::AppState;

/// Build the gateway router with all middleware applied
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .fallback(handlers::proxy)
        .with_state(state.clone());

    with_gateway_layers(router, &state)
}

/// Wrap a router in the gateway middleware stack.
///
/// Outermost first: access log, instrumentation, panic fallback. The panic
/// fallback sits inside instrumentation so its 500s are observed too.
pub fn with_gateway_layers(router: Router, state: &AppState) -> Router {
    router
        .layer(catch_panic_layer())
        .layer(InstrumentationLayer::new(
            state.metrics.clone(),
            state.routes.clone(),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(()),
        )
}
