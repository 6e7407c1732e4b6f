//! Error taxonomy, HTTP status mapping, and the common response envelope.
//!
//! Every stage of the request pipeline resolves its failures into a
//! [`GatewayError`] which is converted immediately into the one JSON shape
//! clients ever see: `{"success": false, "error": "...", ...}`. Internal
//! detail (upstream errors, store errors) is carried alongside for logging
//! and is surfaced in the `stack` field only when the gateway runs in
//! development mode.

use hyper::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Response, StatusCode};
use thiserror::Error;

use crate::proxy::{full, BoxBody};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Every failure the gateway can produce, each mapping to a specific HTTP
/// status and a fixed client-facing message.
///
/// The `Display` impl is the client-facing message; variants that carry a
/// payload keep internal detail out of it so that nothing leaks through the
/// envelope in production configuration.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required-auth route was hit without a bearer credential.
    #[error("Access token required")]
    AuthMissing,

    /// The credential is signature-valid but present on the revocation list.
    #[error("Token has been revoked")]
    AuthRevoked,

    /// The credential failed signature or expiry validation.
    #[error("Invalid or expired token")]
    AuthInvalid,

    /// No route rule matched the request path. Carries the originally
    /// requested path and query, echoed in the response body.
    #[error("Route not found")]
    RouteNotFound(String),

    /// A rate-limit ceiling was exceeded. The message is fixed per policy.
    #[error("{message}")]
    RateLimited {
        /// Policy-specific client-facing message.
        message: &'static str,
        /// The ceiling of the policy that rejected the request.
        limit: u64,
        /// Seconds until the current fixed window ends.
        retry_after: u64,
    },

    /// The upstream service was unreachable, refused the connection, or
    /// timed out. The inner detail is logged, never relayed.
    #[error("Service temporarily unavailable")]
    UpstreamUnavailable(String),

    /// The shared key-value store could not be reached mid-pipeline.
    #[error("Internal server error")]
    Store(String),

    /// Startup configuration was invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for anything unexpected.
    #[error("Internal server error")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code corresponding to this error variant.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthMissing | Self::AuthRevoked => StatusCode::UNAUTHORIZED,
            Self::AuthInvalid => StatusCode::FORBIDDEN,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Internal detail attached to this error, if any. Logged always,
    /// surfaced to clients only in development mode.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::UpstreamUnavailable(d) | Self::Store(d) | Self::Internal(d) => Some(d),
            _ => None,
        }
    }

    /// Converts this error into the common JSON response envelope.
    ///
    /// `development` controls whether the `stack` field (internal error
    /// detail) is included; it is never present otherwise.
    pub fn into_response(self, development: bool) -> Response<BoxBody> {
        let status = self.status_code();

        let mut body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        if let Self::RouteNotFound(path) = &self {
            body["path"] = serde_json::json!(path);
        }
        if development {
            if let Some(detail) = self.detail() {
                body["stack"] = serde_json::json!(detail);
            }
        }

        let mut response = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(full(body.to_string()))
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(full(""));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            });

        if let Self::RateLimited {
            limit, retry_after, ..
        } = &self
        {
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("ratelimit-limit", v);
            }
            headers.insert("ratelimit-remaining", HeaderValue::from_static("0"));
            if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
                headers.insert("ratelimit-reset", v.clone());
                headers.insert(RETRY_AFTER, v);
            }
        }

        response
    }
}
