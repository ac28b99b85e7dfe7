//! Functional tests for request forwarding and upstream failure isolation

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use edge_gateway::metrics::UpstreamFailure;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{body_json, header as header_eq, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{
    build_app, get, json, send, serve, settings_with_upstream, unreachable_url, LogCapture,
};

#[tokio::test]
async fn test_account_balance_is_relayed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC100001/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balance": 500 })))
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, state) = build_app(settings_with_upstream(&upstream.uri()));
    let (status, _, body) = send(&app, get("/accounts/ACC100001/balance")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), json!({ "balance": 500 }));
    assert_eq!(state.metrics.request_count("GET", "/accounts", 200), 1);
}

#[tokio::test]
async fn test_full_path_and_query_are_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/ACC1"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, _) = build_app(settings_with_upstream(&upstream.uri()));
    let (status, _, _) = send(&app, get("/transactions/ACC1?limit=10")).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_method_headers_and_body_are_forwarded() {
    let upstream = MockServer::start().await;
    let transfer = json!({ "from": "ACC100001", "to": "ACC100002", "amount": 25 });
    Mock::given(method("POST"))
        .and(path("/transactions/transfer"))
        .and(header_eq("x-correlation-id", "corr-42"))
        .and(header_eq("authorization", "Bearer test-token"))
        .and(body_json(&transfer))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-transaction-id", "TXN-1")
                .set_body_json(json!({ "status": "accepted" })),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, _) = build_app(settings_with_upstream(&upstream.uri()));
    let request = Request::builder()
        .method("POST")
        .uri("/transactions/transfer")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-correlation-id", "corr-42")
        .header(header::AUTHORIZATION, "Bearer test-token")
        .body(Body::from(transfer.to_string()))
        .unwrap();
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers.get("x-transaction-id").unwrap(), "TXN-1");
    assert_eq!(json(&body), json!({ "status": "accepted" }));
}

#[tokio::test]
async fn test_host_is_rewritten_to_upstream_authority() {
    let upstream = MockServer::start().await;
    let authority = upstream.address().to_string();
    Mock::given(method("GET"))
        .and(path("/auth/session"))
        .and(header_eq("host", authority.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, _) = build_app(settings_with_upstream(&upstream.uri()));
    let request = Request::builder()
        .uri("/auth/session")
        .header(header::HOST, "gateway.example")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed_unchanged() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC999"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": "Account not found" })),
        )
        .mount(&upstream)
        .await;

    let (app, state) = build_app(settings_with_upstream(&upstream.uri()));
    let (status, _, body) = send(&app, get("/accounts/ACC999")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body), json!({ "error": "Account not found" }));
    assert_eq!(state.metrics.request_count("GET", "/accounts", 404), 1);
}

#[tokio::test]
async fn test_redirects_are_relayed_not_followed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications/latest"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/notifications/42"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, _) = build_app(settings_with_upstream(&upstream.uri()));
    let (status, headers, _) = send(&app, get("/notifications/latest")).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/notifications/42");
}

#[tokio::test]
async fn test_cache_hit_header_is_passed_through() {
    let cache = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC100001/balance"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-cache-hit", "true")
                .set_body_json(json!({ "balance": 500 })),
        )
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC100002/balance"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-cache-hit", "false")
                .set_body_json(json!({ "balance": 75 })),
        )
        .mount(&cache)
        .await;

    let mut settings = settings_with_upstream(&unreachable_url());
    settings.cache_proxy.url = cache.uri();
    settings.cache_proxy.enabled = true;
    let (app, _) = build_app(settings);

    let (_, hit, _) = send(&app, get("/accounts/ACC100001/balance")).await;
    let (_, miss, _) = send(&app, get("/accounts/ACC100002/balance")).await;

    assert_eq!(hit.get("x-cache-hit").unwrap(), "true");
    assert_eq!(miss.get("x-cache-hit").unwrap(), "false");
}

#[tokio::test]
async fn test_gateway_never_invents_cache_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let (app, _) = build_app(settings_with_upstream(&upstream.uri()));
    let (_, headers, _) = send(&app, get("/accounts/ACC1/profile")).await;

    assert!(headers.get("x-cache-hit").is_none());
}

#[tokio::test]
async fn test_cache_tier_receives_every_route() {
    let cache = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC1/balance"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/transactions/ACC1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cache)
        .await;

    // Direct upstreams are down; only the cache tier can answer
    let mut settings = settings_with_upstream(&unreachable_url());
    settings.cache_proxy.url = cache.uri();
    settings.cache_proxy.enabled = true;
    let (app, _) = build_app(settings);

    let (accounts, _, _) = send(&app, get("/accounts/ACC1/balance")).await;
    let (transactions, _, _) = send(&app, get("/transactions/ACC1")).await;

    assert_eq!(accounts, StatusCode::OK);
    assert_eq!(transactions, StatusCode::OK);
}

#[tokio::test]
async fn test_unreachable_upstream_returns_503() {
    let (app, state) = build_app(settings_with_upstream(&unreachable_url()));
    let (status, _, body) = send(&app, get("/fraud/score/ACC100001")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body), json!({ "error": "Service unavailable" }));
    assert_eq!(state.metrics.request_count("GET", "/fraud", 503), 1);
    assert_eq!(
        state.metrics.upstream_failure_count("/fraud", UpstreamFailure::Connect),
        1
    );
}

#[tokio::test]
async fn test_outage_is_isolated_to_its_route() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC1/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balance": 1 })))
        .mount(&upstream)
        .await;

    let mut settings = settings_with_upstream(&upstream.uri());
    settings.upstreams.get_mut("fraud").unwrap().url = unreachable_url();
    let (app, _) = build_app(settings);

    let (fraud, _, _) = send(&app, get("/fraud/score/ACC1")).await;
    let (accounts, _, _) = send(&app, get("/accounts/ACC1/balance")).await;

    assert_eq!(fraud, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(accounts, StatusCode::OK);
}

#[tokio::test]
async fn test_slow_upstream_times_out_with_503() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fraud/score/ACC100001"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&upstream)
        .await;

    let mut settings = settings_with_upstream(&upstream.uri());
    settings.upstreams.get_mut("fraud").unwrap().timeout_ms = 200;
    let (app, state) = build_app(settings);

    let started = Instant::now();
    let (status, _, body) = send(&app, get("/fraud/score/ACC100001")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body), json!({ "error": "Service unavailable" }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(state.metrics.request_count("GET", "/fraud", 503), 1);
    assert_eq!(
        state.metrics.upstream_failure_count("/fraud", UpstreamFailure::Timeout),
        1
    );
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_413() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let mut settings = settings_with_upstream(&upstream.uri());
    settings.proxy.max_body_bytes = 16;
    let (app, state) = build_app(settings);

    let request = Request::builder()
        .method("POST")
        .uri("/notifications/send")
        .body(Body::from(vec![b'x'; 64]))
        .unwrap();
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json(&body), json!({ "error": "Payload too large" }));
    assert_eq!(
        state.metrics.request_count("POST", "/notifications", 413),
        1
    );
}

#[tokio::test]
async fn test_head_response_keeps_upstream_content_length() {
    let upstream = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/accounts/ACC100001/statement"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-length", "123"))
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, _) = build_app(settings_with_upstream(&upstream.uri()));
    let gateway = serve(app).await;

    let response = reqwest::Client::new()
        .head(format!("{}/accounts/ACC100001/statement", gateway))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "123");
}

async fn transfer_then_read_balance(cache_enabled: bool) {
    let tier = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transactions/transfer"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-cache-hit", "false")
                .set_body_json(json!({ "status": "completed" })),
        )
        .expect(1)
        .mount(&tier)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/ACC100001/balance"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-cache-hit", "false")
                .set_body_json(json!({ "balance": 475 })),
        )
        .expect(1)
        .mount(&tier)
        .await;

    // Only the tier under test answers; the other path is down
    let mut settings = if cache_enabled {
        settings_with_upstream(&unreachable_url())
    } else {
        settings_with_upstream(&tier.uri())
    };
    settings.cache_proxy.enabled = cache_enabled;
    settings.cache_proxy.url = if cache_enabled {
        tier.uri()
    } else {
        unreachable_url()
    };
    let (app, _) = build_app(settings);

    let transfer = Request::builder()
        .method("POST")
        .uri("/transactions/transfer")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "from": "ACC100001", "to": "ACC100002", "amount": 25 }).to_string(),
        ))
        .unwrap();
    let (status, headers, body) = send(&app, transfer).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers.get("x-cache-hit").unwrap(), "false");
    assert_eq!(json(&body), json!({ "status": "completed" }));

    let (status, headers, body) = send(&app, get("/accounts/ACC100001/balance")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-cache-hit").unwrap(), "false");
    assert_eq!(json(&body), json!({ "balance": 475 }));
}

#[tokio::test]
async fn test_transfer_then_read_through_cache_tier_relays_cache_header() {
    transfer_then_read_balance(true).await;
}

#[tokio::test]
async fn test_transfer_then_read_direct_relays_cache_header() {
    transfer_then_read_balance(false).await;
}

#[tokio::test]
async fn test_upstream_outage_logs_one_access_line_without_error() {
    let logs = LogCapture::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let (app, _) = build_app(settings_with_upstream(&unreachable_url()));
    let (status, _, _) = send(&app, get("/fraud/score/ACC1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let lines = logs.lines();
    let count = |needle: &str| lines.iter().filter(|line| line.contains(needle)).count();
    assert_eq!(count("finished processing request"), 1, "{:#?}", lines);
    assert_eq!(count("Upstream unavailable"), 1, "{:#?}", lines);
    assert_eq!(count("ERROR"), 0, "{:#?}", lines);
}
