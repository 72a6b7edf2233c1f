/**
 * Authentication Routes
 * Cookie-based admin login with per-IP rate limiting
 */
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{
    clear_session_cookie, generate_auth_token, hash_password, is_authenticated, session_cookie,
    verify_password,
};
use crate::ratelimit::RateLimitDecision;
use crate::settings::keys;
use crate::state::AppState;
use crate::store::models::AdminAccount;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present on 429 responses: seconds until the lockout lifts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl LoginResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            name: None,
            role: None,
            error: Some(error.into()),
            retry_after_secs: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub authed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
/// Check credentials against the accounts settings key and install the
/// session cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();

    if payload.username.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::failure("Username and password are required")),
        )
            .into_response();
    }

    // Lockout applies before credentials are even looked at.
    if let RateLimitDecision::Locked { retry_after } = state.limiter.check(&ip).await {
        tracing::warn!(ip = %ip, "login rejected: rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(LoginResponse {
                success: false,
                name: None,
                role: None,
                error: Some("Too many failed login attempts. Try again later.".to_string()),
                retry_after_secs: Some(retry_after.as_secs().max(1)),
            }),
        )
            .into_response();
    }

    let accounts: Vec<AdminAccount> = state.settings.get(keys::ADMIN_ACCOUNTS, Vec::new()).await;

    if accounts.is_empty() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::failure(
                "No admin accounts are registered. Create one in account management first.",
            )),
        )
            .into_response();
    }

    let Some(account) = accounts.iter().find(|a| a.username == payload.username) else {
        state.limiter.record_failure(&ip).await;
        tracing::warn!(ip = %ip, "failed login for unknown username");
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::failure("Invalid username or password")),
        )
            .into_response();
    };

    let mut upgrade_plaintext = false;
    let matched = if let Some(stored_hash) = &account.password_hash {
        verify_password(&payload.password, stored_hash)
    } else if let Some(plain) = &account.password {
        // Legacy plaintext record; upgrade it to a hash below.
        upgrade_plaintext = plain == &payload.password;
        upgrade_plaintext
    } else {
        false
    };

    if !matched {
        state.limiter.record_failure(&ip).await;
        tracing::warn!(ip = %ip, username = %payload.username, "failed login attempt");
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::failure("Invalid username or password")),
        )
            .into_response();
    }

    state.limiter.clear(&ip).await;

    // Stamp lastLogin and perform the plaintext-to-hash upgrade in one
    // write. A failure here must not block the login.
    let updated: Vec<AdminAccount> = accounts
        .iter()
        .map(|a| {
            let mut a = a.clone();
            if a.id == account.id {
                a.last_login = Some(Utc::now().to_rfc3339());
                if upgrade_plaintext {
                    a.password_hash = Some(hash_password(&payload.password));
                    a.password = None;
                }
            }
            a
        })
        .collect();
    if let Err(e) = state.settings.save(keys::ADMIN_ACCOUNTS, &updated).await {
        tracing::warn!("failed to update account metadata after login: {}", e);
    }

    tracing::info!(username = %account.username, "successful login");

    let token = generate_auth_token();
    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, session_cookie(&token))]),
        Json(LoginResponse {
            success: true,
            name: Some(if account.name.is_empty() {
                account.username.clone()
            } else {
                account.name.clone()
            }),
            role: Some(account.role.clone()),
            error: None,
            retry_after_secs: None,
        }),
    )
        .into_response()
}

/// DELETE /api/auth/login
/// Clear the session cookie. Always succeeds; logout is idempotent.
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
        Json(crate::routes::SuccessResponse::ok()),
    )
}

/// GET /api/auth/me
/// Report whether the request carries a valid session. The token embeds no
/// identity, so this answers authed only.
pub async fn me(headers: HeaderMap) -> impl IntoResponse {
    Json(MeResponse {
        authed: is_authenticated(&headers),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileStore;
    use crate::store::Store;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use axum::routing::{delete, get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn seeded_state(dir: &std::path::Path) -> Arc<AppState> {
        AppState::with_store(Arc::new(FileStore::new(dir)))
    }

    async fn seed_account(state: &AppState, username: &str, password: &str, hashed: bool) {
        let account = if hashed {
            serde_json::json!([{
                "id": "acc1",
                "username": username,
                "passwordHash": hash_password(password),
                "name": "데스크",
                "role": "admin",
            }])
        } else {
            serde_json::json!([{
                "id": "acc1",
                "username": username,
                "password": password,
                "name": "데스크",
                "role": "admin",
            }])
        };
        state
            .store
            .save_setting(keys::ADMIN_ACCOUNTS, &account)
            .await
            .unwrap();
    }

    fn auth_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/api/auth/login", post(login).delete(logout))
            .route("/api/auth/me", get(me))
            .with_state(state)
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
    }

    async fn post_login(app: Router, username: &str, password: &str) -> (StatusCode, Vec<String>, serde_json::Value) {
        let body = serde_json::json!({"username": username, "password": password});
        let req = Request::post("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let cookies = res
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(String::from))
            .collect();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, cookies, value)
    }

    #[tokio::test]
    async fn test_login_empty_fields_returns_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let (status, _, _) = post_login(auth_router(state), "", "pw").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_without_accounts_returns_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let (status, _, _) = post_login(auth_router(state), "editor", "pw").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_success_sets_session_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        seed_account(&state, "editor", "편집장비번1", true).await;

        let (status, cookies, body) =
            post_login(auth_router(state.clone()), "editor", "편집장비번1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["name"], "데스크");
        assert_eq!(body["role"], "admin");
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("cp-admin-auth=") && c.contains("HttpOnly")));

        // lastLogin was stamped on the stored account
        let stored = state
            .store
            .get_setting(keys::ADMIN_ACCOUNTS)
            .await
            .unwrap()
            .unwrap();
        assert!(stored[0]["lastLogin"].is_string());
    }

    #[tokio::test]
    async fn test_login_wrong_password_returns_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        seed_account(&state, "editor", "비밀번호", true).await;

        let (status, _, _) = post_login(auth_router(state), "editor", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plaintext_password_upgraded_on_login() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        seed_account(&state, "editor", "평문비번", false).await;

        let (status, _, _) = post_login(auth_router(state.clone()), "editor", "평문비번").await;
        assert_eq!(status, StatusCode::OK);

        let stored = state
            .store
            .get_setting(keys::ADMIN_ACCOUNTS)
            .await
            .unwrap()
            .unwrap();
        assert!(stored[0]["password"].is_null());
        assert_eq!(
            stored[0]["passwordHash"].as_str().unwrap(),
            hash_password("평문비번")
        );
    }

    #[tokio::test]
    async fn test_sixth_attempt_locked_out_even_with_correct_password() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        seed_account(&state, "editor", "올바른비번", true).await;

        for _ in 0..5 {
            let (status, _, _) =
                post_login(auth_router(state.clone()), "editor", "wrong").await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, _, body) =
            post_login(auth_router(state.clone()), "editor", "올바른비번").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["retryAfterSecs"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_me_reflects_cookie_validity() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let app = auth_router(state);

        let req = Request::get("/api/auth/me")
            .header("cookie", format!("cp-admin-auth={}", generate_auth_token()))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: MeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.authed);

        let req = Request::get("/api/auth/me")
            .header("cookie", "cp-admin-auth=true")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: MeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.authed);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let req = Request::delete("/api/auth/login").body(Body::empty()).unwrap();
        let res = auth_router(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
