//! Request handlers for gateway endpoints and the proxy fallback

use axum::{
    extract::{Request, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::Result;
use crate::gateway::HealthStatus;
use crate::AppState;

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.health.report())
}

/// `GET /metrics`
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response> {
    let body = state.metrics.gather()?;
    Ok(([(header::CONTENT_TYPE, state.metrics.content_type())], body).into_response())
}

/// Everything else: proxy by route prefix, or 404
pub async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Result<Response> {
    state.proxy.route(request).await
}
