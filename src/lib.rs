//! An authenticated API gateway for a small fleet of backend services.
//!
//! The gateway is the single client-facing edge of the system: it rate-limits
//! every inbound request, matches it against a static route table, verifies
//! bearer credentials where the matched route requires them, and forwards the
//! request to the target service with identity and origin headers injected.
//! Every failure along the way is normalized into one JSON response envelope.
//!
//! Shared mutable state (rate-limit counters and the credential revocation
//! list) lives in an external TTL key-value store, reached through the
//! [`TtlStore`] abstraction.

pub mod auth;
pub mod config;
pub mod error;
pub mod headers;
pub mod proxy;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod store;

pub use auth::{authenticate, validate_token, Claims};
pub use config::{Config, RuntimeConfig, ServiceRegistry};
pub use error::{GatewayError, Result};
pub use proxy::{build_client, handle_request, BoxBody, HttpClient};
pub use rate_limit::{PolicyLimits, RateLimiter};
pub use routes::{match_route, AuthMode, RouteRule, ServiceName};
pub use server::{serve, shutdown_signal, GatewayState};
pub use store::{MemoryStore, RedisStore, TtlStore};
