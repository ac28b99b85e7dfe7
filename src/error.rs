//! Common error types for the edge gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Upstream for {route} unavailable: {reason}")]
    UpstreamUnavailable { route: String, reason: String },

    #[error("No route matches path: {0}")]
    NoRouteMatch(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Metrics export failed: {0}")]
    MetricsExport(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body returned to clients, e.g. `{"error":"Service unavailable"}`
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

impl AppError {
    /// Status code and client-facing message for this error
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::UpstreamUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
            AppError::NoRouteMatch(_) => (StatusCode::NOT_FOUND, "Not found"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large"),
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::HttpClient(_)
            | AppError::MetricsExport(_)
            | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        match &self {
            // The proxy logs upstream failures with full context where they happen
            AppError::UpstreamUnavailable { .. } => {}
            AppError::NoRouteMatch(path) => debug!(path = %path, "No route matched"),
            AppError::InvalidRequest(reason) => debug!(reason = %reason, "Rejected request"),
            AppError::PayloadTooLarge(limit) => debug!(limit = limit, "Rejected oversized body"),
            _ if status.is_server_error() => error!(error = %self, "Request failed"),
            _ => warn!(error = %self, "Request failed"),
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
