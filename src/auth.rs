//! Bearer credential validation and the revocation check.
//!
//! Validation is two separate stages by design: [`validate_token`] checks
//! signature and expiry against the shared secret and derives the identity
//! claims, then the revocation list in the shared store is consulted for
//! credentials that were explicitly invalidated (logout) before their
//! natural expiry. A revocation entry renders a credential untrusted no
//! matter how valid its signature still is.

use hyper::header::{HeaderMap, AUTHORIZATION};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::routes::AuthMode;
use crate::store::TtlStore;
use crate::{GatewayError, Result};

/// Key prefix for revocation entries in the shared store. The identity
/// service writes `blacklist:<raw token>` on logout; the gateway only reads.
const REVOCATION_PREFIX: &str = "blacklist:";

/// Identity claims carried by a validated credential.
///
/// Derived only from a verified token, injected downstream as headers, and
/// never persisted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user identifier.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Account email address.
    pub email: String,
    /// Display username.
    pub username: String,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default)]
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Extracts the raw bearer token from an `Authorization` header, if any.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Verifies a raw token's signature and expiry against the shared secret
/// and derives its identity claims.
///
/// Does not consult the revocation store and mutates no state. Any
/// malformed, mis-signed, or expired token maps to [`GatewayError::AuthInvalid`].
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| GatewayError::AuthInvalid)
}

/// Returns whether a revocation entry exists for the exact raw token.
pub async fn is_revoked(store: &dyn TtlStore, token: &str) -> Result<bool> {
    let entry = store.get(&format!("{REVOCATION_PREFIX}{token}")).await?;
    Ok(entry.is_some())
}

/// Runs the authentication stage for a route with the given requirement.
///
/// For [`AuthMode::Required`] routes the outcome is strict: a missing
/// credential is `AuthMissing`, a signature/expiry failure is `AuthInvalid`,
/// a revoked credential is `AuthRevoked`, and an unreachable revocation
/// store is an infrastructure error — never silently treated as
/// "not revoked".
///
/// For [`AuthMode::Optional`] routes every one of those conditions merely
/// suppresses the claims; the request still dispatches.
pub async fn authenticate(
    headers: &HeaderMap,
    mode: AuthMode,
    secret: &str,
    store: &dyn TtlStore,
) -> Result<Option<Claims>> {
    if mode == AuthMode::None {
        return Ok(None);
    }

    let token = match extract_bearer(headers) {
        Some(token) => token,
        None => {
            return match mode {
                AuthMode::Required => Err(GatewayError::AuthMissing),
                _ => Ok(None),
            }
        }
    };

    let claims = match validate_token(token, secret) {
        Ok(claims) => claims,
        Err(e) => {
            return match mode {
                AuthMode::Required => Err(e),
                _ => Ok(None),
            }
        }
    };

    match (is_revoked(store, token).await, mode) {
        (Ok(false), _) => Ok(Some(claims)),
        (Ok(true), AuthMode::Required) => Err(GatewayError::AuthRevoked),
        (Ok(true), _) => Ok(None),
        (Err(e), AuthMode::Required) => Err(e),
        (Err(e), _) => {
            warn!(error = %e, "revocation check failed on optional route, continuing without claims");
            Ok(None)
        }
    }
}
