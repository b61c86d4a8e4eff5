//! Access token inspection.
//!
//! Reads the `exp` claim from JWT-shaped tokens without verifying them. The
//! signature is the server's concern; this only tells the client whether a
//! refresh is due. Opaque tokens report no expiry.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Expiry of a JWT access token, if it carries one.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Whether `token` expires within `buffer` of `now`.
///
/// Tokens without a readable expiry are never considered expiring. A buffer
/// reaching past the representable range covers every expiry.
pub fn is_expiring_at(token: &str, buffer: Duration, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => now.checked_add_signed(buffer).is_none_or(|deadline| deadline >= exp),
        None => false,
    }
}

/// [`is_expiring_at`] against the current time.
pub fn is_expiring(token: &str, buffer: Duration) -> bool {
    is_expiring_at(token, buffer, Utc::now())
}
