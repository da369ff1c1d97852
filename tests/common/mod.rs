//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_gateway::config::{AccessRuleConfig, GatewayConfig, QuotaRuleConfig, RouteConfig};
use api_gateway::security::identity::Claims;
use api_gateway::{GatewayServer, Shutdown};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SECRET: &str = "integration-test-secret";

/// Exact bytes the login stub answers with.
pub const LOGIN_RESPONSE: &str = r#"{"access_token":"tok123","token_type":"bearer"}"#;
pub const LOGIN_COOKIE: &str = "session=abc";

/// Serve `app` on an ephemeral port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Upstream that echoes what it received and counts calls.
#[derive(Clone, Default)]
pub struct EchoBackend {
    pub calls: Arc<AtomicUsize>,
    pub last_body: Arc<Mutex<Option<Bytes>>>,
}

impl EchoBackend {
    pub async fn start(&self) -> SocketAddr {
        let app = Router::new()
            .route("/{*path}", any(echo))
            .with_state(self.clone());
        serve(app).await
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Bytes> {
        self.last_body.lock().unwrap().clone()
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

async fn echo(State(backend): State<EchoBackend>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    backend.calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_body.lock().unwrap() = Some(body.clone());

    if uri.path() == "/api/auth/login" {
        return (
            StatusCode::OK,
            [
                (header::SET_COOKIE, LOGIN_COOKIE),
                (header::CONTENT_TYPE, "application/json"),
            ],
            LOGIN_RESPONSE,
        )
            .into_response();
    }

    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "body": String::from_utf8_lossy(&body),
        "x_user_id": header_text(&headers, "x-user-id"),
        "x_user_role": header_text(&headers, "x-user-role"),
        "x_from_gateway": header_text(&headers, "x-from-gateway"),
        "x_request_id": header_text(&headers, "x-request-id"),
        "authorization": header_text(&headers, "authorization"),
    }))
    .into_response()
}

/// Event-stream upstream that emits an event every 50ms until the
/// connection goes away.
#[derive(Clone, Default)]
pub struct StreamBackend {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
    /// Delay before the response head is sent.
    pub head_delay: Duration,
}

struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StreamBackend {
    pub async fn start(&self) -> SocketAddr {
        let app = Router::new()
            .route("/{*path}", any(stream_events))
            .with_state(self.clone());
        serve(app).await
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

async fn stream_events(State(backend): State<StreamBackend>) -> Response {
    backend.opened.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(backend.head_delay).await;
    let guard = ReleaseGuard(backend.released.clone());

    let events = futures_util::stream::unfold((guard, 0u64), |(guard, n)| async move {
        if n > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let event = format!("data: {{\"seq\": {}}}\n\n", n);
        Some((Ok::<_, Infallible>(Bytes::from(event)), (guard, n + 1)))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(events))
        .unwrap()
}

/// Audit sink that keeps every record it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub records: Arc<Mutex<Vec<Value>>>,
}

impl RecordingSink {
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/audit", post(collect))
            .with_state(self.clone());
        format!("http://{}/audit", serve(app).await)
    }

    /// Records for `trace_id`, waiting until at least `count` have arrived.
    pub async fn wait_for(&self, trace_id: &str, count: usize) -> Vec<Value> {
        for _ in 0..100 {
            let found = self.for_trace(trace_id);
            if found.len() >= count {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.for_trace(trace_id)
    }

    pub fn for_trace(&self, trace_id: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["trace_id"] == trace_id)
            .cloned()
            .collect()
    }
}

async fn collect(State(sink): State<RecordingSink>, Json(record): Json<Value>) -> StatusCode {
    sink.records.lock().unwrap().push(record);
    StatusCode::CREATED
}

/// Signed credential for `sub`, valid for an hour.
pub fn token(sub: &str, role: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.map(str::to_string),
        exp: (chrono::Utc::now().timestamp() + 3600) as u64,
        extra: Map::new(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Gateway configuration with every route pointed at `upstream`.
pub fn config(upstream: SocketAddr, stream_upstream: Option<SocketAddr>, audit_url: Option<String>) -> GatewayConfig {
    let base = format!("http://{}", upstream);

    let mut sbom = RouteConfig::new("sbom", "/api/sbom/", &base);
    sbom.upload_paths.push("/api/sbom/upload".to_string());

    let stream_base = stream_upstream.map(|a| format!("http://{}", a)).unwrap_or_else(|| base.clone());
    let mut vuln = RouteConfig::new("vuln", "/api/vuln/", &stream_base);
    vuln.stream_paths.push("/api/vuln/stream".to_string());

    let mut config = GatewayConfig::default();
    config.auth.secret = SECRET.to_string();
    config.routes = vec![RouteConfig::new("auth", "/api/auth/", &base), sbom, vuln];
    config.access_policy = vec![
        AccessRuleConfig::public("/api/auth/*"),
        AccessRuleConfig::roles("/api/sbom/*", &["developer"]),
        AccessRuleConfig::public("/api/vuln/stream"),
        AccessRuleConfig::roles("/api/vuln/*", &["developer"]),
    ];
    config.rate_limit.routes = vec![QuotaRuleConfig {
        pattern: "/api/auth/login".to_string(),
        quota: "5 per 60s".to_string(),
    }];
    config.audit.sink_url = audit_url;
    config.observability.metrics_enabled = false;
    config
}

/// A running gateway; shuts down when dropped.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    server: Option<JoinHandle<()>>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();

        let server = GatewayServer::new(config).await.unwrap();
        let rx = shutdown.subscribe();
        let handle = tokio::spawn(async move {
            server.run(listener, rx).await.unwrap();
        });

        Self {
            addr,
            shutdown,
            server: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and report whether the server finished within `limit`.
    pub async fn stop_within(&mut self, limit: Duration) -> bool {
        self.shutdown.trigger();
        match self.server.take() {
            Some(handle) => matches!(tokio::time::timeout(limit, handle).await, Ok(Ok(()))),
            None => true,
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
