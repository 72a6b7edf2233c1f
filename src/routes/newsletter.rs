/**
 * Newsletter Routes
 * Settings-backed subscriber list: public subscribe, admin management,
 * token-based unsubscribe links
 */
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use chrono::Utc;
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::require_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::settings::keys;
use crate::state::AppState;
use crate::store::models::{Subscriber, SubscriberStatus};
use crate::store::Store;

/// Hard cap on the subscriber list.
const MAX_SUBSCRIBERS: usize = 10_000;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex");
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriberListResponse {
    pub success: bool,
    pub subscribers: Vec<Subscriber>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeByEmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeTokenQuery {
    pub token: Option<String>,
}

fn new_unsubscribe_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 32)
}

/// Like comments, the subscriber list is read-modify-write over one
/// settings key, so reads bypass the TTL cache.
async fn load_subscribers(state: &AppState) -> Result<Vec<Subscriber>, crate::store::StoreError> {
    let value = state.store.get_setting(keys::NEWSLETTER_SUBSCRIBERS).await?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

async fn save_subscribers(
    state: &AppState,
    subscribers: &[Subscriber],
) -> Result<(), crate::store::StoreError> {
    let value = serde_json::to_value(subscribers)?;
    state
        .store
        .save_setting(keys::NEWSLETTER_SUBSCRIBERS, &value)
        .await
}

fn storage_error(e: crate::store::StoreError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("newsletter store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Storage error")),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/db/newsletter - subscriber list (auth required).
/// Legacy rows without an unsubscribe token get one minted here.
pub async fn list_subscribers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    let mut subscribers = match load_subscribers(&state).await {
        Ok(subs) => subs,
        Err(e) => return storage_error(e).into_response(),
    };

    let mut minted = false;
    for sub in &mut subscribers {
        if sub.token.is_none() {
            sub.token = Some(new_unsubscribe_token());
            minted = true;
        }
    }
    if minted {
        if let Err(e) = save_subscribers(&state, &subscribers).await {
            tracing::warn!("failed to persist minted unsubscribe tokens: {}", e);
        }
    }

    (
        StatusCode::OK,
        Json(SubscriberListResponse {
            success: true,
            subscribers,
        }),
    )
        .into_response()
}

/// POST /api/db/newsletter { email, name? } - public subscribe.
/// Subscribing an address that already unsubscribed reactivates it.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubscribeRequest>,
) -> impl IntoResponse {
    if !EMAIL_REGEX.is_match(&payload.email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("A valid email address is required")),
        )
            .into_response();
    }

    let mut subscribers = match load_subscribers(&state).await {
        Ok(subs) => subs,
        Err(e) => return storage_error(e).into_response(),
    };

    if subscribers.len() >= MAX_SUBSCRIBERS {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Subscriber limit reached")),
        )
            .into_response();
    }

    if let Some(existing) = subscribers.iter_mut().find(|s| s.email == payload.email) {
        if existing.status == SubscriberStatus::Active {
            return (
                StatusCode::OK,
                Json(SubscribeResponse {
                    success: true,
                    message: Some("Already subscribed".to_string()),
                }),
            )
                .into_response();
        }
        existing.status = SubscriberStatus::Active;
    } else {
        subscribers.push(Subscriber {
            id: uuid::Uuid::new_v4().to_string(),
            email: payload.email,
            name: payload.name,
            subscribed_at: Utc::now().format("%Y-%m-%d").to_string(),
            status: SubscriberStatus::Active,
            token: Some(new_unsubscribe_token()),
        });
    }

    match save_subscribers(&state, &subscribers).await {
        Ok(()) => (
            StatusCode::OK,
            Json(SubscribeResponse {
                success: true,
                message: None,
            }),
        )
            .into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// DELETE /api/db/newsletter?email=xxx - admin unsubscribe by address
pub async fn unsubscribe_by_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UnsubscribeByEmailQuery>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }
    let Some(email) = query.email.filter(|e| !e.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("email required")),
        )
            .into_response();
    };

    let subscribers: Vec<Subscriber> = match load_subscribers(&state).await {
        Ok(subs) => subs
            .into_iter()
            .map(|mut s| {
                if s.email == email {
                    s.status = SubscriberStatus::Unsubscribed;
                }
                s
            })
            .collect(),
        Err(e) => return storage_error(e).into_response(),
    };

    match save_subscribers(&state, &subscribers).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

fn unsubscribe_page(heading: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><title>구독 해제</title></head>\n\
         <body style=\"font-family:sans-serif;text-align:center;padding:60px;color:#333;\">\n  \
         <h2>{}</h2>\n  <p>{}</p>\n</body></html>",
        heading, message
    ))
}

/// GET /api/newsletter/unsubscribe?token=xxx - public unsubscribe link from
/// newsletter footers; answers a small HTML page
pub async fn unsubscribe_by_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeTokenQuery>,
) -> impl IntoResponse {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            unsubscribe_page("잘못된 요청", "유효하지 않은 구독 해제 링크입니다."),
        )
            .into_response();
    };

    let subscribers = match load_subscribers(&state).await {
        Ok(subs) => subs,
        Err(e) => {
            tracing::error!("newsletter store error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                unsubscribe_page("오류", "잠시 후 다시 시도해주세요."),
            )
                .into_response();
        }
    };

    let is_active_token = subscribers
        .iter()
        .any(|s| s.token.as_deref() == Some(token.as_str()) && s.status == SubscriberStatus::Active);
    if !is_active_token {
        return (
            StatusCode::OK,
            unsubscribe_page("이미 처리된 요청", "이미 구독 해제되었거나 잘못된 링크입니다."),
        )
            .into_response();
    }

    let updated: Vec<Subscriber> = subscribers
        .into_iter()
        .map(|mut s| {
            if s.token.as_deref() == Some(token.as_str()) {
                s.status = SubscriberStatus::Unsubscribed;
            }
            s
        })
        .collect();

    if let Err(e) = save_subscribers(&state, &updated).await {
        tracing::error!("failed to persist unsubscribe: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            unsubscribe_page("오류", "잠시 후 다시 시도해주세요."),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        unsubscribe_page("구독 해제 완료", "뉴스레터 구독이 해제되었습니다."),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_auth_token;
    use crate::store::file::FileStore;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> Router {
        let state = AppState::with_store(Arc::new(FileStore::new(dir)));
        Router::new()
            .route(
                "/api/db/newsletter",
                get(list_subscribers)
                    .post(subscribe)
                    .delete(unsubscribe_by_email),
            )
            .route("/api/newsletter/unsubscribe", get(unsubscribe_by_token))
            .with_state(state)
    }

    async fn post_subscribe(app: &Router, email: &str) -> StatusCode {
        let body = serde_json::json!({"email": email, "name": "독자"});
        let req = Request::post("/api/db/newsletter")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        app.clone().oneshot(req).await.unwrap().status()
    }

    async fn admin_list(app: &Router) -> SubscriberListResponse {
        let req = Request::get("/api/db/newsletter")
            .header("cookie", format!("cp-admin-auth={}", generate_auth_token()))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_validates_email() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        assert_eq!(post_subscribe(&app, "not-an-email").await, StatusCode::BAD_REQUEST);
        assert_eq!(post_subscribe(&app, "reader@example.com").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_requires_auth_and_mints_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        post_subscribe(&app, "reader@example.com").await;

        let req = Request::get("/api/db/newsletter").body(Body::empty()).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let list = admin_list(&app).await;
        assert_eq!(list.subscribers.len(), 1);
        assert!(list.subscribers[0].token.is_some());
    }

    #[tokio::test]
    async fn test_resubscribe_reactivates() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        post_subscribe(&app, "reader@example.com").await;

        // Admin unsubscribes the address
        let req = Request::delete("/api/db/newsletter?email=reader@example.com")
            .header("cookie", format!("cp-admin-auth={}", generate_auth_token()))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(matches!(
            admin_list(&app).await.subscribers[0].status,
            SubscriberStatus::Unsubscribed
        ));

        // Re-subscribing flips it back to active without duplicating
        post_subscribe(&app, "reader@example.com").await;
        let list = admin_list(&app).await;
        assert_eq!(list.subscribers.len(), 1);
        assert!(matches!(
            list.subscribers[0].status,
            SubscriberStatus::Active
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_by_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        post_subscribe(&app, "reader@example.com").await;
        let token = admin_list(&app).await.subscribers[0]
            .token
            .clone()
            .unwrap();

        let req = Request::get(format!("/api/newsletter/unsubscribe?token={}", token))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(matches!(
            admin_list(&app).await.subscribers[0].status,
            SubscriberStatus::Unsubscribed
        ));

        // Second use of the token reports already-processed
        let req = Request::get(format!("/api/newsletter/unsubscribe?token={}", token))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        // Missing token is a 400
        let req = Request::get("/api/newsletter/unsubscribe")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
