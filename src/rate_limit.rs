//! Fixed-window rate limiting over the shared TTL store.
//!
//! Two independent policies coexist: a global per-address ceiling applied to
//! every inbound request, and a stricter ceiling scoped to credential-
//! issuance paths. A request to a credential path consumes quota from both.
//! Counters are keyed by `(policy, address, window index)` and incremented
//! atomically in the store, so concurrent requests from one address cannot
//! overshoot a ceiling. Reset happens by natural TTL expiry of the window
//! key, never by explicit clearing.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::store::TtlStore;
use crate::{GatewayError, Result};

/// Shared fixed-window length for both policies: 15 minutes.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default global ceiling: requests per window per client address.
pub const DEFAULT_GLOBAL_MAX: u64 = 100;

/// Default ceiling for credential-issuance paths per window per address.
pub const DEFAULT_AUTH_MAX: u64 = 5;

/// Rejection message for the global policy.
const GLOBAL_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Rejection message for the auth policy.
const AUTH_MESSAGE: &str = "Too many authentication attempts, please try again later.";

/// The two rate-limit policies the gateway enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Applied to every inbound request.
    Global,
    /// Applied only to credential-issuance paths, on top of `Global`.
    Auth,
}

impl Policy {
    /// Stable name used in store keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Auth => "auth",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Global => GLOBAL_MESSAGE,
            Self::Auth => AUTH_MESSAGE,
        }
    }
}

/// Ceiling and window of one policy.
#[derive(Debug, Clone, Copy)]
pub struct PolicyLimits {
    /// Maximum requests allowed per window per client address.
    pub max_requests: u64,
    /// Fixed window length.
    pub window: Duration,
}

/// Fixed-window request counter over the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn TtlStore>,
    global: PolicyLimits,
    auth: PolicyLimits,
}

/// Returns `true` for paths that issue or reset credentials, which fall
/// under the stricter auth policy.
pub fn is_credential_path(path: &str) -> bool {
    path.starts_with("/api/auth")
}

impl RateLimiter {
    /// Creates a limiter with the default ceilings and window.
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self::with_limits(
            store,
            PolicyLimits {
                max_requests: DEFAULT_GLOBAL_MAX,
                window: DEFAULT_WINDOW,
            },
            PolicyLimits {
                max_requests: DEFAULT_AUTH_MAX,
                window: DEFAULT_WINDOW,
            },
        )
    }

    /// Creates a limiter with explicit per-policy limits.
    pub fn with_limits(store: Arc<dyn TtlStore>, global: PolicyLimits, auth: PolicyLimits) -> Self {
        Self {
            store,
            global,
            auth,
        }
    }

    /// Checks one policy for one client address against the current window.
    ///
    /// Returns `Ok(())` when within the ceiling, `GatewayError::RateLimited`
    /// with the policy's message and retry delay when over it, or a store
    /// error when the counter cannot be reached (the request fails closed).
    pub async fn check(&self, policy: Policy, addr: IpAddr) -> Result<()> {
        self.check_at(policy, addr, unix_now()).await
    }

    /// [`Self::check`] with an explicit clock, used by the window tests.
    pub async fn check_at(&self, policy: Policy, addr: IpAddr, now: i64) -> Result<()> {
        let limits = match policy {
            Policy::Global => self.global,
            Policy::Auth => self.auth,
        };

        let window_secs = limits.window.as_secs().max(1) as i64;
        let window_index = now / window_secs;
        let key = format!("ratelimit:{}:{}:{}", policy.as_str(), addr, window_index);

        let count = self.store.incr_with_ttl(&key, limits.window).await?;

        if count > limits.max_requests {
            let retry_after = ((window_index + 1) * window_secs - now).max(1) as u64;
            warn!(
                policy = policy.as_str(),
                client = %addr,
                count,
                limit = limits.max_requests,
                "rate limit exceeded"
            );
            return Err(GatewayError::RateLimited {
                message: policy.message(),
                limit: limits.max_requests,
                retry_after,
            });
        }

        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
