//! Expiration checks over decoded credential claims.
//!
//! Every check fails closed: missing claims or a missing `exp` count as
//! expired. The `_at` variants take the current unix time explicitly.

use chrono::Utc;
use tracing::debug;

use super::token::{self, Claims};

/// Look-ahead window used to decide a credential should be refreshed (5 minutes)
pub const DEFAULT_LOOKAHEAD_SECS: i64 = 300;

fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn is_expired_at(claims: Option<&Claims>, now: i64) -> bool {
    match claims.and_then(|c| c.exp) {
        Some(exp) => exp < now,
        None => true,
    }
}

pub fn is_expired(claims: Option<&Claims>) -> bool {
    is_expired_at(claims, now())
}

pub fn is_expiring_soon_at(claims: Option<&Claims>, lookahead_secs: i64, now: i64) -> bool {
    match claims.and_then(|c| c.exp) {
        Some(exp) => exp < now.saturating_add(lookahead_secs),
        None => true,
    }
}

pub fn is_expiring_soon(claims: Option<&Claims>, lookahead_secs: i64) -> bool {
    is_expiring_soon_at(claims, lookahead_secs, now())
}

/// Seconds left before expiry, never negative
pub fn time_until_expiry_at(claims: Option<&Claims>, now: i64) -> i64 {
    claims
        .and_then(|c| c.exp)
        .map(|exp| exp.saturating_sub(now).max(0))
        .unwrap_or(0)
}

pub fn time_until_expiry(claims: Option<&Claims>) -> i64 {
    time_until_expiry_at(claims, now())
}

/// Decode and check a raw credential. Undecodable credentials are expired.
pub fn is_token_expired_at(token: &str, now: i64) -> bool {
    match token::decode(token) {
        Ok(claims) => is_expired_at(Some(&claims), now),
        Err(e) => {
            debug!(error = %e, "Credential failed to decode, treating as expired");
            true
        }
    }
}

pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, now())
}
