//! Environment-driven configuration and validated runtime state.
//!
//! The gateway reads its configuration exactly once at startup. Every
//! recognized option and its local-development default is enumerated here;
//! the raw string values are then validated into a [`RuntimeConfig`] holding
//! parsed addresses so that nothing on the request hot path has to parse or
//! fall back.

use std::net::SocketAddr;
use std::time::Duration;

use hyper::Uri;

use crate::routes::ServiceName;
use crate::{GatewayError, Result};

/// Default port the gateway listens on.
pub const DEFAULT_PORT: u16 = 4000;

/// Default shared secret for verifying bearer credentials. Suitable for
/// local development only.
pub const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-key";

/// Default address of the shared TTL key-value store.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Default allowed origin for browser clients.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Default base address of the identity (auth) service.
pub const DEFAULT_AUTH_SERVICE_URL: &str = "http://localhost:4001";

/// Default base address of the work-item (task) service.
pub const DEFAULT_TASK_SERVICE_URL: &str = "http://localhost:4002";

/// Default base address of the assistance (AI) service.
pub const DEFAULT_AI_SERVICE_URL: &str = "http://localhost:4003";

/// Default base address of the profile (user) service.
pub const DEFAULT_USER_SERVICE_URL: &str = "http://localhost:4004";

/// Default base address of the realtime service.
pub const DEFAULT_REALTIME_SERVICE_URL: &str = "http://localhost:4005";

/// Default total timeout for one upstream round-trip. Expiry yields 502.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw configuration values as read from the environment.
///
/// `None` means the variable was unset; defaults are applied during
/// [`Config::into_runtime`], never scattered at use sites.
#[derive(Debug, Default)]
pub struct Config {
    /// `PORT` — port the gateway listens on.
    pub port: Option<String>,
    /// `JWT_SECRET` — shared secret for credential verification.
    pub jwt_secret: Option<String>,
    /// `REDIS_URL` — address of the shared TTL key-value store.
    pub redis_url: Option<String>,
    /// `CORS_ORIGIN` — allowed origin for browser clients.
    pub cors_origin: Option<String>,
    /// `AUTH_SERVICE_URL` — identity service base address.
    pub auth_service_url: Option<String>,
    /// `TASK_SERVICE_URL` — work-item service base address.
    pub task_service_url: Option<String>,
    /// `AI_SERVICE_URL` — assistance service base address.
    pub ai_service_url: Option<String>,
    /// `USER_SERVICE_URL` — profile service base address.
    pub user_service_url: Option<String>,
    /// `REALTIME_SERVICE_URL` — realtime service base address.
    pub realtime_service_url: Option<String>,
    /// `UPSTREAM_TIMEOUT_MS` — upstream round-trip timeout in milliseconds.
    pub upstream_timeout_ms: Option<String>,
    /// `GATEWAY_ENV` — `"development"` enables error detail in responses.
    pub environment: Option<String>,
}

impl Config {
    /// Reads every recognized variable from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through an arbitrary lookup function.
    ///
    /// Lets tests supply values without mutating process-global state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: lookup("PORT"),
            jwt_secret: lookup("JWT_SECRET"),
            redis_url: lookup("REDIS_URL"),
            cors_origin: lookup("CORS_ORIGIN"),
            auth_service_url: lookup("AUTH_SERVICE_URL"),
            task_service_url: lookup("TASK_SERVICE_URL"),
            ai_service_url: lookup("AI_SERVICE_URL"),
            user_service_url: lookup("USER_SERVICE_URL"),
            realtime_service_url: lookup("REALTIME_SERVICE_URL"),
            upstream_timeout_ms: lookup("UPSTREAM_TIMEOUT_MS"),
            environment: lookup("GATEWAY_ENV"),
        }
    }

    /// Validates all fields, producing a [`RuntimeConfig`] with parsed
    /// addresses and defaults applied.
    pub fn into_runtime(self) -> Result<RuntimeConfig> {
        let port = match self.port.as_deref() {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| GatewayError::Config(format!("invalid PORT \"{raw}\": {e}")))?,
            None => DEFAULT_PORT,
        };
        let listen = SocketAddr::from(([0, 0, 0, 0], port));

        let upstream_timeout = match self.upstream_timeout_ms.as_deref() {
            Some(raw) => Duration::from_millis(raw.parse::<u64>().map_err(|e| {
                GatewayError::Config(format!("invalid UPSTREAM_TIMEOUT_MS \"{raw}\": {e}"))
            })?),
            None => DEFAULT_UPSTREAM_TIMEOUT,
        };

        let services = ServiceRegistry {
            auth: validate_base_url(
                "AUTH_SERVICE_URL",
                self.auth_service_url.as_deref(),
                DEFAULT_AUTH_SERVICE_URL,
            )?,
            tasks: validate_base_url(
                "TASK_SERVICE_URL",
                self.task_service_url.as_deref(),
                DEFAULT_TASK_SERVICE_URL,
            )?,
            ai: validate_base_url(
                "AI_SERVICE_URL",
                self.ai_service_url.as_deref(),
                DEFAULT_AI_SERVICE_URL,
            )?,
            users: validate_base_url(
                "USER_SERVICE_URL",
                self.user_service_url.as_deref(),
                DEFAULT_USER_SERVICE_URL,
            )?,
            realtime: validate_base_url(
                "REALTIME_SERVICE_URL",
                self.realtime_service_url.as_deref(),
                DEFAULT_REALTIME_SERVICE_URL,
            )?,
        };

        Ok(RuntimeConfig {
            listen,
            jwt_secret: self.jwt_secret.unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            redis_url: self.redis_url.unwrap_or_else(|| DEFAULT_REDIS_URL.into()),
            cors_origin: self
                .cors_origin
                .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.into()),
            services,
            upstream_timeout,
            development: self.environment.as_deref() == Some("development"),
        })
    }
}

/// Static mapping from logical service name to base address, resolved once
/// at startup. Never mutates afterwards.
#[derive(Debug)]
pub struct ServiceRegistry {
    /// Identity service base address.
    pub auth: Uri,
    /// Work-item service base address.
    pub tasks: Uri,
    /// Assistance service base address.
    pub ai: Uri,
    /// Profile service base address.
    pub users: Uri,
    /// Realtime service base address.
    pub realtime: Uri,
}

impl ServiceRegistry {
    /// Resolves a logical service name to its configured base address.
    pub fn base(&self, service: ServiceName) -> &Uri {
        match service {
            ServiceName::Auth => &self.auth,
            ServiceName::Tasks => &self.tasks,
            ServiceName::Ai => &self.ai,
            ServiceName::Users => &self.users,
            ServiceName::Realtime => &self.realtime,
        }
    }
}

/// Fully validated configuration, created once at startup and shared across
/// all request handlers.
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Socket address the gateway binds to.
    pub listen: SocketAddr,
    /// Shared secret for verifying bearer credentials.
    pub jwt_secret: String,
    /// Address of the shared TTL key-value store.
    pub redis_url: String,
    /// Allowed origin for browser clients.
    pub cors_origin: String,
    /// Base addresses of the downstream services.
    pub services: ServiceRegistry,
    /// Total timeout for one upstream round-trip.
    pub upstream_timeout: Duration,
    /// When set, error responses include internal detail in a `stack` field.
    pub development: bool,
}

/// Parses a service base address, requiring scheme and authority so the
/// forwarder can build upstream URIs without re-validating per request.
fn validate_base_url(name: &str, value: Option<&str>, default: &str) -> Result<Uri> {
    let raw = value.unwrap_or(default);
    let uri = raw
        .parse::<Uri>()
        .map_err(|e| GatewayError::Config(format!("invalid {name} \"{raw}\": {e}")))?;

    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(GatewayError::Config(format!(
            "{name} must include scheme and host: {raw}"
        )));
    }
    Ok(uri)
}
