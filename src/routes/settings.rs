/**
 * Settings Routes
 * Key-value site configuration: cached public reads, admin write-through
 */
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::require_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/db/settings
#[derive(Debug, Deserialize)]
pub struct SettingsQuery {
    pub key: Option<String>,
    /// JSON-encoded fallback returned when the key has no value
    pub fallback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub value: Value,
}

/// Body for PUT /api/db/settings
#[derive(Debug, Deserialize, Serialize)]
pub struct SaveSettingRequest {
    pub key: String,
    pub value: Value,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/db/settings?key=xxx&fallback=json
/// Public read through the TTL cache. Headline, menu, and category data is
/// rendered on public pages, so no auth here. Backend failures are masked
/// by the cache and come back as the fallback.
pub async fn get_setting(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SettingsQuery>,
) -> impl IntoResponse {
    let Some(key) = query.key.filter(|k| !k.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("key required")),
        )
            .into_response();
    };

    let fallback = match query.fallback.as_deref() {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("fallback must be valid JSON")),
                )
                    .into_response();
            }
        },
        None => Value::Null,
    };

    let value = state.settings.get_value(&key, fallback).await;
    (
        StatusCode::OK,
        Json(SettingsResponse {
            success: true,
            value,
        }),
    )
        .into_response()
}

/// PUT /api/db/settings { key, value } (auth required)
/// Writes through to the store. The read cache is not invalidated; readers
/// may see the previous value for up to one TTL.
pub async fn save_setting(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SaveSettingRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    if payload.key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("key required")),
        )
            .into_response();
    }

    match state.settings.save(&payload.key, &payload.value).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => {
            tracing::error!(key = %payload.key, "failed to save setting: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to save setting")),
            )
                .into_response()
        }
    }
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
            .route("/api/db/settings", get(get_setting).put(save_setting))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_get_without_key_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::get("/api/db/settings").body(Body::empty()).unwrap();
        let res = app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_unknown_key_returns_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::get(
            "/api/db/settings?key=cp-popup-settings&fallback=%7B%22enabled%22%3Afalse%7D",
        )
        .body(Body::empty())
        .unwrap();
        let res = app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: SettingsResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.value["enabled"], false);
    }

    #[tokio::test]
    async fn test_put_requires_auth() {
        let dir = tempfile::tempdir().unwrap();
        let body = serde_json::json!({"key": "cp-popup-settings", "value": {"enabled": true}});
        let req = Request::put("/api/db/settings")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let res = app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let body = serde_json::json!({"key": "cp-popup-settings", "value": {"enabled": true}});
        let req = Request::put("/api/db/settings")
            .header("content-type", "application/json")
            .header("cookie", format!("cp-admin-auth={}", generate_auth_token()))
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        // Nothing was cached for this key before the write, so the first
        // read observes the saved value.
        let req = Request::get("/api/db/settings?key=cp-popup-settings")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: SettingsResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.value["enabled"], true);
    }
}
