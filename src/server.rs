//! Server accept loop, shared state, and graceful shutdown.
//!
//! Contains the runtime infrastructure between the TCP listener and the
//! per-request pipeline. This module is decoupled from `main()` so the
//! server logic stays testable without process-level concerns like signal
//! handling or `std::process::exit`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::headers::apply_cors;
use crate::proxy::{handle_request, BoxBody, HttpClient};
use crate::rate_limit::RateLimiter;
use crate::store::TtlStore;

/// Runtime state shared across all request handlers.
pub struct GatewayState {
    /// Validated configuration, immutable after startup.
    pub config: RuntimeConfig,
    /// Shared TTL store holding rate-limit counters and the revocation list.
    pub store: Arc<dyn TtlStore>,
    /// Fixed-window rate limiter over the shared store.
    pub limiter: RateLimiter,
    /// Startup instant, reported as uptime by the health endpoint.
    pub started_at: Instant,
}

impl GatewayState {
    /// Builds the shared state with default rate-limit policies.
    pub fn new(config: RuntimeConfig, store: Arc<dyn TtlStore>) -> Self {
        let limiter = RateLimiter::new(Arc::clone(&store));
        Self {
            config,
            store,
            limiter,
            started_at: Instant::now(),
        }
    }
}

/// Accepts connections on `listener` and dispatches each request through
/// the gateway pipeline using the given upstream `client` and shared state.
///
/// Runs until `shutdown` resolves, then stops accepting new connections and
/// returns. In-flight requests on already-spawned connection tasks continue
/// to completion independently; a client that disconnects early drops its
/// connection task and with it any in-flight upstream call.
pub async fn serve(
    listener: TcpListener,
    client: HttpClient,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, client_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%e, "failed to accept connection");
                        continue;
                    }
                };

                let client = client.clone();
                let state = Arc::clone(&state);

                tokio::spawn(async move {
                    let svc = service_fn(move |req: hyper::Request<Incoming>| {
                        let client = client.clone();
                        let state = Arc::clone(&state);
                        async move {
                            let development = state.config.development;
                            let origin = state.config.cors_origin.clone();

                            let mut resp: Response<BoxBody> =
                                handle_request(req, client, state, client_addr)
                                    .await
                                    .unwrap_or_else(|e| e.into_response(development));

                            apply_cors(resp.headers_mut(), &origin);
                            Ok::<_, std::convert::Infallible>(resp)
                        }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        warn!(%e, "connection error");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down, no longer accepting connections");
                break;
            }
        }
    }
}

/// Awaits a shutdown signal (SIGINT or SIGTERM on Unix, Ctrl+C on all
/// platforms). Returns once the first signal is received.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, initiating graceful shutdown");
    }
}
