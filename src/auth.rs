//! Cookie authentication.
//!
//! The admin session is a stateless HMAC token carried in an HttpOnly
//! cookie: `timestamp_millis.hex(hmac_sha256(timestamp_millis, secret))`.
//! Validity is purely a function of the signature and wall-clock age (24
//! hours), so there is no server-side session state and no revocation
//! short of rotating `COOKIE_SECRET`. The token carries no user identity;
//! name and role travel only in the login response body for display.

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::routes::ErrorResponse;

type HmacSha256 = Hmac<Sha256>;

/// Admin auth cookie name.
pub const COOKIE_NAME: &str = "cp-admin-auth";

/// Cookie / token lifetime.
pub const COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24;

const TOKEN_MAX_AGE_MS: i64 = COOKIE_MAX_AGE_SECS * 1000;

lazy_static::lazy_static! {
    /// HMAC secret for the auth cookie.
    static ref COOKIE_SECRET: String = std::env::var("COOKIE_SECRET")
        .unwrap_or_else(|_| "cp-cookie-secret-2024-change-me".to_string());

    /// Salt mixed into password hashes.
    static ref PASSWORD_SALT: String = std::env::var("PASSWORD_SALT")
        .unwrap_or_else(|_| "cp-salt-2024".to_string());
}

/// The insecure default refused in production at startup.
pub const DEFAULT_COOKIE_SECRET: &str = "cp-cookie-secret-2024-change-me";

// ============================================================================
// Token
// ============================================================================

fn timestamp_mac(ts_ms: i64) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(COOKIE_SECRET.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(ts_ms.to_string().as_bytes());
    mac
}

fn sign_timestamp(ts_ms: i64) -> String {
    hex::encode(timestamp_mac(ts_ms).finalize().into_bytes())
}

pub(crate) fn token_at(ts_ms: i64) -> String {
    format!("{}.{}", ts_ms, sign_timestamp(ts_ms))
}

/// Mint a fresh auth token for the current instant.
pub fn generate_auth_token() -> String {
    token_at(Utc::now().timestamp_millis())
}

pub(crate) fn verify_auth_token_at(value: &str, now_ms: i64) -> bool {
    // The pre-HMAC cookie scheme stored the literal "true"; reject it
    // explicitly.
    if value.is_empty() || value == "true" {
        return false;
    }
    let Some((ts, sig)) = value.split_once('.') else {
        return false;
    };
    if ts.is_empty() || sig.is_empty() {
        return false;
    }
    let Ok(ts_ms) = ts.parse::<i64>() else {
        return false;
    };
    if now_ms - ts_ms > TOKEN_MAX_AGE_MS {
        return false;
    }
    let Ok(provided) = hex::decode(sig) else {
        return false;
    };
    // verify_slice is constant-time; a byte-by-byte mismatch must not leak
    // position through timing.
    timestamp_mac(ts_ms).verify_slice(&provided).is_ok()
}

/// Verify a token's signature and 24-hour age window.
pub fn verify_auth_token(value: &str) -> bool {
    verify_auth_token_at(value, Utc::now().timestamp_millis())
}

// ============================================================================
// Passwords
// ============================================================================

/// Salted SHA-256 password hash, hex-encoded. Account records under the
/// `cp-admin-accounts` settings key store this form.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(PASSWORD_SALT.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let computed = hash_password(password);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

// ============================================================================
// Cookie handling
// ============================================================================

/// Pull the auth cookie value out of the request's `Cookie` header.
pub fn auth_cookie_value(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            if name == COOKIE_NAME {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Whether the request carries a valid admin session.
pub fn is_authenticated(headers: &HeaderMap) -> bool {
    auth_cookie_value(headers)
        .map(|v| verify_auth_token(&v))
        .unwrap_or(false)
}

fn secure_attribute() -> &'static str {
    if std::env::var("ENVIRONMENT").as_deref() == Ok("production") {
        "; Secure"
    } else {
        ""
    }
}

/// `Set-Cookie` value that installs the admin session.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        COOKIE_NAME,
        token,
        COOKIE_MAX_AGE_SECS,
        secure_attribute()
    )
}

/// `Set-Cookie` value that clears the admin session.
pub fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        COOKIE_NAME,
        secure_attribute()
    )
}

/// Per-handler admin gate; returns the 401 response for unauthenticated
/// requests.
pub fn require_admin(headers: &HeaderMap) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_authenticated(headers) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                success: false,
                error: "Authentication required".to_string(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_generated_token_verifies() {
        let token = generate_auth_token();
        assert!(verify_auth_token(&token));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let now = Utc::now().timestamp_millis();
        assert!(!verify_auth_token_at("", now));
        assert!(!verify_auth_token_at("true", now));
        assert!(!verify_auth_token_at("no-separator", now));
        assert!(!verify_auth_token_at("abc.def", now)); // non-numeric timestamp
        assert!(!verify_auth_token_at(&format!("{}.", now), now)); // empty signature
        assert!(!verify_auth_token_at(&format!("{}.zzzz", now), now)); // not hex
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let token = generate_auth_token();
        let (ts, sig) = token.split_once('.').unwrap();
        let mut bytes = hex::decode(sig).unwrap();
        bytes[0] ^= 0xff;
        let tampered = format!("{}.{}", ts, hex::encode(bytes));
        assert!(!verify_auth_token(&tampered));
    }

    #[test]
    fn test_tampered_timestamp_rejected() {
        let token = generate_auth_token();
        let (ts, sig) = token.split_once('.').unwrap();
        let shifted: i64 = ts.parse::<i64>().unwrap() - 1000;
        assert!(!verify_auth_token(&format!("{}.{}", shifted, sig)));
    }

    #[test]
    fn test_token_age_boundary() {
        let now = Utc::now().timestamp_millis();

        // 23h59m old: still valid
        let fresh_ts = now - (23 * 60 + 59) * 60 * 1000;
        assert!(verify_auth_token_at(&token_at(fresh_ts), now));

        // 24h01m old: expired
        let stale_ts = now - (24 * 60 + 1) * 60 * 1000;
        assert!(!verify_auth_token_at(&token_at(stale_ts), now));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("비밀번호123");
        assert_eq!(hash.len(), 64);
        assert!(verify_password("비밀번호123", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; cp-admin-auth=abc.def; theme=dark"),
        );
        assert_eq!(auth_cookie_value(&headers).as_deref(), Some("abc.def"));

        let empty = HeaderMap::new();
        assert!(auth_cookie_value(&empty).is_none());
        assert!(!is_authenticated(&empty));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok");
        assert!(cookie.starts_with("cp-admin-auth=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=86400"));

        let cleared = clear_session_cookie();
        assert!(cleared.contains("Max-Age=0"));
    }
}
