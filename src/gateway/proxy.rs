//! Generic reverse proxy driven by the route table

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Request},
    response::Response,
};
use http_body_util::LengthLimitError;
use reqwest::{redirect, Client};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::gateway::resolver::{resolve, upstream_url, RoutingConfig};
use crate::gateway::route::{Route, RouteTable};
use crate::metrics::{Metrics, UpstreamFailure};

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to the upstream resolved for their route
pub struct ProxyRouter {
    client: Client,
    routes: Arc<RouteTable>,
    routing: RoutingConfig,
    metrics: Metrics,
    max_body_bytes: usize,
}

impl ProxyRouter {
    /// Create a new proxy router
    pub fn new(
        routes: Arc<RouteTable>,
        routing: RoutingConfig,
        metrics: Metrics,
        max_body_bytes: usize,
    ) -> Result<Self> {
        // Per-route timeouts are applied on each request
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            routes,
            routing,
            metrics,
            max_body_bytes,
        })
    }

    /// Match the request against the route table and forward it
    pub async fn route(&self, request: Request<Body>) -> Result<Response> {
        let path = request.uri().path().to_string();
        let route = self
            .routes
            .match_path(&path)
            .ok_or(AppError::NoRouteMatch(path))?;

        self.forward(route, request).await
    }

    /// Forward a request to the route's resolved upstream
    pub async fn forward(&self, route: &Route, request: Request<Body>) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let base = resolve(route, &self.routing);
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        let url = upstream_url(base, path_and_query);

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| self.body_error(e))?;

        let mut headers = parts.headers;
        strip_request_headers(&mut headers);

        debug!(route = %route.prefix(), method = %parts.method, url = %url, "Forwarding request");

        let mut outbound = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .timeout(route.timeout());
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        let upstream = outbound
            .send()
            .await
            .map_err(|e| self.unavailable(route, &url, e))?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_response_headers(&mut response_headers);

        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| self.unavailable(route, &url, e))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    fn body_error(&self, err: axum::Error) -> AppError {
        let err = err.into_inner();
        if err.is::<LengthLimitError>() {
            AppError::PayloadTooLarge(self.max_body_bytes)
        } else {
            AppError::InvalidRequest(format!("Failed to read request body: {}", err))
        }
    }

    fn unavailable(&self, route: &Route, url: &str, err: reqwest::Error) -> AppError {
        let failure = classify(&err);
        warn!(
            route = %route.prefix(),
            upstream = %url,
            reason = failure.as_str(),
            error = %err,
            "Upstream unavailable"
        );
        self.metrics.upstream_failure(route.prefix(), failure);

        AppError::UpstreamUnavailable {
            route: route.prefix().to_string(),
            reason: err.to_string(),
        }
    }
}

fn classify(err: &reqwest::Error) -> UpstreamFailure {
    if err.is_timeout() {
        UpstreamFailure::Timeout
    } else if err.is_connect() {
        UpstreamFailure::Connect
    } else {
        UpstreamFailure::Other
    }
}

fn remove_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop as well
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Prepare inbound headers for the upstream hop.
///
/// `Host` is dropped so the client derives it from the upstream URL.
pub fn strip_request_headers(headers: &mut HeaderMap) {
    remove_hop_by_hop(headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
}

/// Prepare upstream headers for the client hop.
///
/// `Content-Length` is relayed as sent, so HEAD responses keep the upstream length.
pub fn strip_response_headers(headers: &mut HeaderMap) {
    remove_hop_by_hop(headers);
}
