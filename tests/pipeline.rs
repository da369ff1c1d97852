//! End-to-end behavior of the request pipeline against stub upstreams.

mod common;

use common::{closed_addr, config, token, EchoBackend, RecordingSink, TestGateway, LOGIN_COOKIE, LOGIN_RESPONSE};
use reqwest::{header, StatusCode};
use serde_json::Value;

#[tokio::test]
async fn test_unauthenticated_request_never_reaches_upstream() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let response = reqwest::get(gateway.url("/api/sbom/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].is_string());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/sbom/items"))
        .bearer_auth(token("bob", Some("viewer")))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_request_is_forwarded_with_identity_headers() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/sbom/items?page=2"))
        .bearer_auth(token("alice", Some("developer")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"{"name":"component-list"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();

    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["uri"], "/api/sbom/items?page=2");
    assert_eq!(echoed["body"], r#"{"name":"component-list"}"#);
    assert_eq!(echoed["x_user_id"], "alice");
    assert_eq!(echoed["x_user_role"], "developer");
    assert_eq!(echoed["x_from_gateway"], "true");
    assert_eq!(echoed["x_request_id"], request_id.as_str());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_spoofed_identity_headers_are_replaced() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/auth/me"))
        .header("x-user-id", "admin")
        .header("x-user-role", "admin")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["x_user_id"], Value::Null);
    assert_eq!(echoed["x_user_role"], Value::Null);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let response = reqwest::get(gateway.url("/api/nowhere/else")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_login_quota_rejects_sixth_attempt() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let response = client.post(gateway.url("/api/auth/login")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = client.post(gateway.url("/api/auth/login")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_header: u64 = response.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_header));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["retry_after"].as_u64(), Some(retry_header));
    assert_eq!(backend.calls(), 5);
}

#[tokio::test]
async fn test_login_is_relayed_untouched() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let credentials = r#"{"username":"alice","password":"secret"}"#;
    let response = reqwest::Client::new()
        .post(gateway.url("/api/auth/login"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(credentials)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::SET_COOKIE], LOGIN_COOKIE);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(response.bytes().await.unwrap(), LOGIN_RESPONSE.as_bytes());
    assert_eq!(backend.last_body().unwrap(), credentials.as_bytes());
}

#[tokio::test]
async fn test_credential_cookie_authenticates() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/sbom/items"))
        .header(header::COOKIE, format!("theme=dark; access_token={}", token("alice", Some("developer"))))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.json().await.unwrap();
    assert_eq!(echoed["x_user_id"], "alice");
}

#[tokio::test]
async fn test_trace_ids_are_fresh_or_propagated() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let gateway = TestGateway::start(config(upstream, None, None)).await;
    let client = reqwest::Client::new();

    let first = client.get(gateway.url("/api/auth/me")).send().await.unwrap();
    let second = client.get(gateway.url("/api/auth/me")).send().await.unwrap();
    assert_ne!(first.headers()["x-request-id"], second.headers()["x-request-id"]);

    let traced = client
        .get(gateway.url("/api/auth/me"))
        .header("x-request-id", "trace-abc")
        .send()
        .await
        .unwrap();
    assert_eq!(traced.headers()["x-request-id"], "trace-abc");

    let echoed: Value = traced.json().await.unwrap();
    assert_eq!(echoed["x_request_id"], "trace-abc");
}

#[tokio::test]
async fn test_audit_records_request_then_response() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let sink = RecordingSink::default();
    let sink_url = sink.start().await;
    let gateway = TestGateway::start(config(upstream, None, Some(sink_url))).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/sbom/items"))
        .bearer_auth(token("alice", Some("developer")))
        .header("x-request-id", "trace-audit")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let records = sink.wait_for("trace-audit", 2).await;
    assert_eq!(records.len(), 2);

    assert_eq!(records[0]["event_type"], "request");
    assert_eq!(records[0]["user_id"], "alice");
    assert_eq!(records[0]["request_body"], "payload");
    assert!(records[0].get("status_code").is_none());

    assert_eq!(records[1]["event_type"], "response");
    assert_eq!(records[1]["status_code"], 200);
    assert!(records[1]["duration_ms"].is_u64());
}

#[tokio::test]
async fn test_rejection_is_audited_with_its_status() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let sink = RecordingSink::default();
    let sink_url = sink.start().await;
    let gateway = TestGateway::start(config(upstream, None, Some(sink_url))).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/sbom/items"))
        .header("x-request-id", "trace-rejected")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let records = sink.wait_for("trace-rejected", 2).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["event_type"], "response");
    assert_eq!(records[1]["status_code"], 401);
    assert_eq!(records[1]["metadata"]["rejected"], "unauthenticated");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let backend = EchoBackend::default();
    let upstream = backend.start().await;
    let sink = RecordingSink::default();
    let sink_url = sink.start().await;

    let mut config = config(upstream, None, Some(sink_url));
    let dead = closed_addr().await;
    for route in config.routes.iter_mut().filter(|r| r.name == "sbom") {
        route.upstream = format!("http://{}", dead);
    }
    let gateway = TestGateway::start(config).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/sbom/items"))
        .bearer_auth(token("alice", Some("developer")))
        .header("x-request-id", "trace-down")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let records = sink.wait_for("trace-down", 2).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["event_type"], "error");
    assert!(records[1].get("status_code").is_none());
    assert_eq!(records[1]["metadata"]["error_kind"], "upstream_unavailable");

    let message = records[1]["metadata"]["error"].as_str().unwrap();
    assert!(message.starts_with("Upstream unavailable: "), "{}", message);
    assert!(message.to_lowercase().contains("connect"), "{}", message);
}
