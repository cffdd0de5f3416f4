//! Access token expiry inspection.
//!
//! Access tokens are three dot-separated segments whose middle segment is a
//! base64url-encoded JSON claim set. Only the `exp` claim (seconds since the
//! Unix epoch) is read; the signature is not verified, which is the server's
//! job.
//!
//! Anything that cannot be decoded counts as expired.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Decode the `exp` claim of an access token.
///
/// Returns `None` if the token is not three segments, the middle segment is
/// not base64url JSON, or `exp` is missing or not an integer.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.exp, 0)
}

/// Whether `token` should be treated as expired at `now`.
///
/// A token is expired once `now` reaches its `exp`. Undecodable tokens are
/// always expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => now >= exp,
        None => {
            tracing::debug!("Access token could not be decoded, treating as expired");
            true
        }
    }
}

#[cfg(test)]
pub(crate) fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"kim@example.com","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, claims)
}
