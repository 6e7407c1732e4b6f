//! The per-request gateway pipeline: rate limiting, dispatch, authentication,
//! and upstream forwarding.
//!
//! Every inbound request is assigned a monotonically increasing request ID
//! and wrapped in a [`tracing::Span`] carrying structured fields for
//! observability. The pipeline is an ordered sequence of stages, each
//! returning either a continuation value or a terminal [`GatewayError`];
//! there is no retry loop and no shared mutable request context.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};

use crate::auth::authenticate;
use crate::headers;
use crate::rate_limit::{is_credential_path, Policy};
use crate::routes::{match_route, RouteRule, ROUTES};
use crate::server::GatewayState;
use crate::{AuthMode, GatewayError, Result};

/// An alias to simplify the calls to `Box<dyn std::error::Error + Send + Sync>`.
type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased body used for both request forwarding and response synthesis.
///
/// Erases `Incoming` (upstream responses), `Full` (locally built responses),
/// and whatever body type the inbound request carries into one uniform type.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, StdError>;

/// The HTTP client type used for upstream connections.
pub type HttpClient = Client<HttpConnector, BoxBody>;

/// Global monotonic counter for assigning unique request IDs.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Constructs the upstream [`HttpClient`] shared by all request handlers.
pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Wraps a complete in-memory payload as a [`BoxBody`].
pub fn full(body: impl Into<Bytes>) -> BoxBody {
    Full::new(body.into())
        .map_err(|never| -> StdError { match never {} })
        .boxed()
}

/// Processes a single inbound request through the gateway pipeline.
///
/// Stage order, each terminal on failure:
///
/// 1. **CORS preflight** — `OPTIONS` requests are answered locally with 204.
/// 2. **Health** — `/health` is answered locally, before rate limiting, so
///    liveness probes still respond when the shared store is down.
/// 3. **Rate limiting** — the global per-address fixed window is consumed by
///    every request; credential-issuance paths additionally consume the
///    stricter auth window. Exceeding either yields 429.
/// 4. **Docs** — `GET /api/docs` is answered locally with the route table.
/// 5. **Dispatch** — first matching route rule wins; no match yields 404.
/// 6. **Authentication** — per the rule's auth mode; required routes reject
///    missing (401), invalid (403), and revoked (401) credentials, optional
///    routes merely lose the claims.
/// 7. **Forwarding** — the path is rewritten per the rule and the request is
///    relayed to the target service with identity and origin headers
///    injected. Connect failures and timeouts yield a generic 502.
pub async fn handle_request<B>(
    req: Request<B>,
    client: HttpClient,
    state: Arc<GatewayState>,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody>>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<StdError>,
{
    let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let method = req.method().clone();
    let uri = req.uri().clone();

    let span = tracing::info_span!(
        "request",
        id = request_id,
        method = %method,
        uri = %uri,
        client = %client_addr,
    );

    async move {
        let path = uri.path().to_string();

        if method == Method::OPTIONS {
            return Ok(preflight_response(&state.config.cors_origin));
        }

        if path == "/health" {
            return Ok(health_response(&state).await);
        }

        let client_ip = client_addr.ip();
        state.limiter.check(Policy::Global, client_ip).await?;
        if is_credential_path(&path) {
            state.limiter.check(Policy::Auth, client_ip).await?;
        }

        if method == Method::GET && path == "/api/docs" {
            return Ok(docs_response());
        }

        let rule = match_route(&path).ok_or_else(|| {
            debug!("no route matched");
            let requested = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(&path)
                .to_string();
            GatewayError::RouteNotFound(requested)
        })?;

        let claims = authenticate(
            req.headers(),
            rule.auth,
            &state.config.jwt_secret,
            state.store.as_ref(),
        )
        .await?;

        forward(req, rule, claims, client, &state, client_addr).await
    }
    .instrument(span)
    .await
}

/// Forwards a dispatched request to its target service and relays the
/// upstream response verbatim.
async fn forward<B>(
    req: Request<B>,
    rule: &RouteRule,
    claims: Option<crate::Claims>,
    client: HttpClient,
    state: &GatewayState,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody>>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<StdError>,
{
    let base = state.config.services.base(rule.service);
    let (mut parts, body) = req.into_parts();

    let rewritten = rule.rewrite(parts.uri.path());
    let upstream_uri = build_upstream_uri(base, &rewritten, parts.uri.query())?;

    headers::strip_hop_by_hop(&mut parts.headers);
    headers::clear_identity_headers(&mut parts.headers);
    if let Some(claims) = &claims {
        headers::inject_identity_headers(&mut parts.headers, claims);
    }
    headers::append_forwarded_for(&mut parts.headers, client_addr.ip());
    headers::rewrite_host(
        &mut parts.headers,
        base.authority()
            .ok_or_else(|| GatewayError::Internal("service base has no authority".into()))?,
    );

    info!(
        service = rule.service.as_str(),
        upstream = %upstream_uri,
        authenticated = claims.is_some(),
        "forwarding request"
    );

    parts.uri = upstream_uri;
    let proxy_req = Request::from_parts(parts, body.map_err(Into::into).boxed());

    let start = std::time::Instant::now();
    let upstream_result = timeout(state.config.upstream_timeout, client.request(proxy_req)).await;

    let mut upstream_resp = match upstream_result {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!(
                error = %e,
                service = rule.service.as_str(),
                latency_ms = start.elapsed().as_millis() as u64,
                "upstream request failed"
            );
            return Err(GatewayError::UpstreamUnavailable(e.to_string()));
        }
        Err(_elapsed) => {
            warn!(
                timeout = ?state.config.upstream_timeout,
                service = rule.service.as_str(),
                "upstream request timed out"
            );
            return Err(GatewayError::UpstreamUnavailable(format!(
                "upstream timed out after {:?}",
                state.config.upstream_timeout
            )));
        }
    };

    info!(
        status = upstream_resp.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        service = rule.service.as_str(),
        "upstream responded"
    );

    headers::strip_hop_by_hop(upstream_resp.headers_mut());

    let (parts, body) = upstream_resp.into_parts();
    Ok(Response::from_parts(
        parts,
        body.map_err(|e| -> StdError { Box::new(e) }).boxed(),
    ))
}

/// Builds the upstream URI from a service base address, a rewritten path,
/// and the original query string.
fn build_upstream_uri(base: &Uri, path: &str, query: Option<&str>) -> Result<Uri> {
    let scheme = base
        .scheme()
        .ok_or_else(|| GatewayError::Internal("service base has no scheme".into()))?;
    let authority = base
        .authority()
        .ok_or_else(|| GatewayError::Internal("service base has no authority".into()))?;

    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };

    Uri::builder()
        .scheme(scheme.clone())
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| GatewayError::Internal(format!("failed to build upstream URI: {e}")))
}

/// Answers a CORS preflight locally.
fn preflight_response(origin: &str) -> Response<BoxBody> {
    let mut response = Response::new(full(""));
    *response.status_mut() = StatusCode::NO_CONTENT;
    headers::apply_preflight(response.headers_mut(), origin);
    response
}

/// Gateway liveness: healthy only when the shared store answers a ping.
async fn health_response(state: &GatewayState) -> Response<BoxBody> {
    match state.store.ping().await {
        Ok(()) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "data": {
                    "status": "healthy",
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "uptime": state.started_at.elapsed().as_secs(),
                    "services": {
                        "store": "connected",
                        "gateway": "running",
                    },
                },
            }),
        ),
        Err(e) => {
            warn!(error = %e, "health check failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "success": false,
                    "error": "Service unhealthy",
                    "details": e.detail().unwrap_or("store unreachable"),
                }),
            )
        }
    }
}

/// A static description of the route table.
fn docs_response() -> Response<BoxBody> {
    let routes: Vec<serde_json::Value> = ROUTES
        .iter()
        .map(|rule| {
            serde_json::json!({
                "prefix": rule.prefix,
                "target": rule.service.as_str(),
                "auth": match rule.auth {
                    AuthMode::None => "none",
                    AuthMode::Required => "required",
                    AuthMode::Optional => "optional",
                },
            })
        })
        .collect();

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "success": true,
            "data": {
                "name": "API Gateway",
                "version": env!("CARGO_PKG_VERSION"),
                "description": "Authenticated request gateway for the backend services",
                "routes": routes,
                "endpoints": {
                    "GET /health": "Gateway and store liveness",
                    "GET /api/docs": "This description",
                },
            },
        }),
    )
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full(body.to_string()))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(full(""));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
