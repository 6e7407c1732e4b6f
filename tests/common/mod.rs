//! Shared test infrastructure for integration tests.
//!
//! Provides throwaway HTTP backend servers, gateway state builders, token
//! issuance, and body-collection helpers used across all integration test
//! modules. Backends echo the request line and headers so tests can assert
//! exactly what the gateway forwarded.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use api_gateway::{
    BoxBody, Claims, Config, GatewayState, HttpClient, MemoryStore, PolicyLimits, RateLimiter,
    TtlStore,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Shared secret used to sign and verify test tokens.
pub const TEST_SECRET: &str = "test-secret";

/// A synthetic client address used in all test invocations.
pub const TEST_CLIENT_ADDR: &str = "192.168.1.100:54321";

pub fn test_addr() -> SocketAddr {
    TEST_CLIENT_ADDR.parse().unwrap()
}

pub fn test_client() -> HttpClient {
    Client::builder(TokioExecutor::new())
        .build(hyper_util::client::legacy::connect::HttpConnector::new())
}

/// Starts a local HTTP server that echoes the request line and headers:
/// first body line is `METHOD path?query`, followed by sorted
/// `name: value` header lines. Returns its address and task handle.
pub async fn start_echo_backend() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("backend must bind");
    let addr = listener.local_addr().expect("backend must have an address");

    let handle = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let svc = service_fn(|req: Request<Incoming>| async move {
                    let request_line = format!(
                        "{} {}",
                        req.method(),
                        req.uri()
                            .path_and_query()
                            .map(|pq| pq.as_str())
                            .unwrap_or("/"),
                    );
                    let mut header_lines: Vec<String> = req
                        .headers()
                        .iter()
                        .filter_map(|(name, value)| {
                            value
                                .to_str()
                                .ok()
                                .map(|v| format!("{}: {}", name.as_str(), v))
                        })
                        .collect();
                    header_lines.sort();

                    let mut lines = vec![request_line];
                    lines.extend(header_lines);

                    Ok::<_, std::convert::Infallible>(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header("content-type", "text/plain")
                            .body(Full::new(Bytes::from(lines.join("\n"))))
                            .expect("test response must build"),
                    )
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    (addr, handle)
}

/// Builds gateway state with every downstream service pointing at `backend`
/// and the given store. Uses a short upstream timeout so failure tests
/// finish quickly.
pub fn gateway_state(backend: SocketAddr, store: Arc<dyn TtlStore>) -> Arc<GatewayState> {
    let base = format!("http://{backend}");
    let config = Config::from_lookup(|name| match name {
        "AUTH_SERVICE_URL" | "TASK_SERVICE_URL" | "AI_SERVICE_URL" | "USER_SERVICE_URL"
        | "REALTIME_SERVICE_URL" => Some(base.clone()),
        "JWT_SECRET" => Some(TEST_SECRET.to_string()),
        "UPSTREAM_TIMEOUT_MS" => Some("2000".to_string()),
        _ => None,
    })
    .into_runtime()
    .expect("test config must be valid");

    Arc::new(GatewayState::new(config, store))
}

/// Like [`gateway_state`], but with explicit rate-limit ceilings.
pub fn gateway_state_with_limits(
    backend: SocketAddr,
    store: Arc<dyn TtlStore>,
    global: PolicyLimits,
    auth: PolicyLimits,
) -> Arc<GatewayState> {
    let state = gateway_state(backend, Arc::clone(&store));
    let state = Arc::try_unwrap(state).unwrap_or_else(|_| unreachable!("state is unshared"));
    Arc::new(GatewayState {
        limiter: RateLimiter::with_limits(store, global, auth),
        ..state
    })
}

/// Issues a signed token for the standard test identity, expiring after
/// `ttl_secs` (negative values produce an already-expired token).
pub fn issue_token(ttl_secs: i64) -> String {
    issue_token_for("u-42", "dev@example.com", "dev", ttl_secs)
}

/// Issues a signed token with explicit identity claims.
pub fn issue_token_for(user_id: &str, email: &str, username: &str, ttl_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be past the epoch")
        .as_secs() as i64;
    let claims = Claims {
        user_id: user_id.into(),
        email: email.into(),
        username: username.into(),
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("test token must encode")
}

/// Builds an empty-bodied request for the gateway pipeline.
pub fn request(method: &str, path: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Empty::new())
        .expect("test request must build")
}

/// Builds an empty-bodied request carrying a bearer token.
pub fn authed_request(method: &str, path: &str, token: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .body(Empty::new())
        .expect("test request must build")
}

/// Collects a [`BoxBody`] into a UTF-8 string.
pub async fn read_body(response: Response<BoxBody>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to collect response body")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// A store whose every operation fails, simulating an unreachable backend
/// store.
pub struct FailingStore;

#[async_trait::async_trait]
impl TtlStore for FailingStore {
    async fn get(&self, _key: &str) -> api_gateway::Result<Option<String>> {
        Err(api_gateway::GatewayError::Store("store unreachable".into()))
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: &str,
        _ttl: std::time::Duration,
    ) -> api_gateway::Result<()> {
        Err(api_gateway::GatewayError::Store("store unreachable".into()))
    }

    async fn incr_with_ttl(&self, _key: &str, _ttl: std::time::Duration) -> api_gateway::Result<u64> {
        Err(api_gateway::GatewayError::Store("store unreachable".into()))
    }

    async fn ping(&self) -> api_gateway::Result<()> {
        Err(api_gateway::GatewayError::Store("store unreachable".into()))
    }
}

/// Shorthand for a fresh in-memory store.
pub fn memory_store() -> Arc<dyn TtlStore> {
    Arc::new(MemoryStore::new())
}
