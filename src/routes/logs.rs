/**
 * Audit Log Routes
 * View logs (public append, admin read) and distribute logs (admin only)
 */
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::require_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use crate::store::models::{DistributeLog, ViewLogEntry};
use crate::store::{NewViewLog, Store};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddViewLogRequest {
    pub article_id: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewLogsResponse {
    pub success: bool,
    pub logs: Vec<ViewLogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DistributeLogsResponse {
    pub success: bool,
    pub logs: Vec<DistributeLog>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddDistributeLogsRequest {
    pub logs: Vec<DistributeLog>,
}

fn storage_error(e: crate::store::StoreError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("log store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Storage error")),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/db/view-logs { articleId, path? }
/// Public: anonymous page views are what this log records.
pub async fn add_view_log(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddViewLogRequest>,
) -> impl IntoResponse {
    if payload.article_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("articleId required")),
        )
            .into_response();
    }

    let entry = NewViewLog {
        article_id: payload.article_id,
        path: payload.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".to_string()),
    };
    match state.store.add_view_log(entry).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// GET /api/db/view-logs (auth required)
pub async fn view_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    match state.store.view_logs().await {
        Ok(logs) => (
            StatusCode::OK,
            Json(ViewLogsResponse {
                success: true,
                logs,
            }),
        )
            .into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// GET /api/db/distribute-logs (auth required)
pub async fn distribute_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    match state.store.distribute_logs().await {
        Ok(logs) => (
            StatusCode::OK,
            Json(DistributeLogsResponse {
                success: true,
                logs,
            }),
        )
            .into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// POST /api/db/distribute-logs { logs } (auth required)
pub async fn add_distribute_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AddDistributeLogsRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    match state.store.add_distribute_logs(payload.logs).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// DELETE /api/db/distribute-logs (auth required)
pub async fn clear_distribute_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    match state.store.clear_distribute_logs().await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}
