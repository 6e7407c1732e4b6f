//! HTTP header processing for the forwarding pipeline.
//!
//! Covers hop-by-hop removal per RFC 7230 Section 6.1, the `X-Forwarded-For`
//! origin chain, identity header injection for authenticated requests, and
//! the CORS headers attached for browser clients.

use std::net::IpAddr;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::http::uri::Authority;

use crate::auth::Claims;

/// Identity headers injected downstream for authenticated requests.
pub const USER_ID_HEADER: &str = "x-user-id";
/// See [`USER_ID_HEADER`].
pub const USER_EMAIL_HEADER: &str = "x-user-email";
/// See [`USER_ID_HEADER`].
pub const USER_USERNAME_HEADER: &str = "x-user-username";

/// Removes all hop-by-hop headers from the given header map: the standard
/// RFC 7230 Section 6.1 set plus any names declared in the `Connection`
/// header value.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let declared: Vec<HeaderName> = headers
        .get("connection")
        .and_then(|val| val.to_str().ok())
        .map(|val| {
            val.split(',')
                .filter_map(|s| HeaderName::from_bytes(s.trim().as_bytes()).ok())
                .collect()
        })
        .unwrap_or_default();

    for name in &declared {
        headers.remove(name);
    }

    for name in [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
    ] {
        headers.remove(name);
    }
}

/// Appends the client address to the `X-Forwarded-For` chain, preserving
/// any value set by proxies in front of the gateway.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let client_ip = client_ip.to_string();
    let chain = headers
        .get("x-forwarded-for")
        .and_then(|existing| existing.to_str().ok())
        .map(|existing| format!("{existing}, {client_ip}"))
        .unwrap_or(client_ip);

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert("x-forwarded-for", value);
    }
}

/// Injects the identity headers derived from validated claims. Any
/// client-supplied values for these headers are replaced, so downstream
/// services can trust them unconditionally.
pub fn inject_identity_headers(headers: &mut HeaderMap, claims: &Claims) {
    let pairs = [
        (USER_ID_HEADER, &claims.user_id),
        (USER_EMAIL_HEADER, &claims.email),
        (USER_USERNAME_HEADER, &claims.username),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
}

/// Removes any client-supplied identity headers. Applied on every forwarded
/// request before (possible) re-injection, so unauthenticated requests can
/// never spoof an identity downstream.
pub fn clear_identity_headers(headers: &mut HeaderMap) {
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_EMAIL_HEADER);
    headers.remove(USER_USERNAME_HEADER);
}

/// Rewrites the `Host` header to the upstream authority so the target
/// service sees itself as the host.
pub fn rewrite_host(headers: &mut HeaderMap, upstream_auth: &Authority) {
    if let Ok(value) = HeaderValue::from_str(upstream_auth.as_str()) {
        headers.insert(hyper::header::HOST, value);
    }
}

/// Attaches the CORS headers for the configured browser origin to a
/// response.
pub fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert("access-control-allow-origin", value);
    }
    headers.insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );
}

/// Attaches the additional headers a CORS preflight answer carries.
pub fn apply_preflight(headers: &mut HeaderMap, origin: &str) {
    apply_cors(headers, origin);
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("authorization, content-type"),
    );
}
