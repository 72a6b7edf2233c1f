/**
 * Comment Routes
 * Settings-backed reader comments: public submission lands as pending,
 * admins approve, reject, or delete
 */
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::require_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::settings::keys;
use crate::state::AppState;
use crate::store::models::{Comment, CommentStatus};
use crate::store::Store;

const MAX_AUTHOR_CHARS: usize = 20;
const MAX_CONTENT_CHARS: usize = 500;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    #[serde(rename = "articleId")]
    pub article_id: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentListResponse {
    pub success: bool,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub article_id: String,
    #[serde(default)]
    pub article_title: Option<String>,
    pub author: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModerateCommentRequest {
    pub id: String,
    pub status: CommentStatus,
}

/// Comments are read straight from the store, not through the settings
/// cache: moderation is a read-modify-write over the whole list, and a
/// cached read here would resurrect just-deleted or just-approved entries.
async fn load_comments(state: &AppState) -> Result<Vec<Comment>, crate::store::StoreError> {
    let value = state.store.get_setting(keys::COMMENTS).await?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

fn storage_error(e: crate::store::StoreError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("comment store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Storage error")),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/db/comments?articleId=xxx - approved comments for one article;
/// without articleId the full list (the admin dashboard's view)
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommentListQuery>,
) -> impl IntoResponse {
    let all = match load_comments(&state).await {
        Ok(all) => all,
        Err(e) => return storage_error(e).into_response(),
    };
    let comments = match query.article_id {
        Some(id) => all
            .into_iter()
            .filter(|c| c.article_id == id && c.status == CommentStatus::Approved)
            .collect(),
        None => all,
    };
    (
        StatusCode::OK,
        Json(CommentListResponse {
            success: true,
            comments,
        }),
    )
        .into_response()
}

/// POST /api/db/comments - public submission, stored as pending
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCommentRequest>,
) -> impl IntoResponse {
    let author = payload.author.trim();
    let content = payload.content.trim();

    if payload.article_id.is_empty() || author.is_empty() || content.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("articleId, author, and content are required")),
        )
            .into_response();
    }
    if author.chars().count() > MAX_AUTHOR_CHARS {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Author name must be 20 characters or fewer")),
        )
            .into_response();
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Comment must be 500 characters or fewer")),
        )
            .into_response();
    }

    let mut all = match load_comments(&state).await {
        Ok(all) => all,
        Err(e) => return storage_error(e).into_response(),
    };
    all.push(Comment {
        id: Uuid::new_v4().to_string(),
        article_id: payload.article_id,
        article_title: payload.article_title,
        author: author.to_string(),
        content: content.to_string(),
        created_at: Utc::now().format("%Y-%m-%d").to_string(),
        status: CommentStatus::Pending,
    });

    match save_comments(&state, &all).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

async fn save_comments(
    state: &AppState,
    comments: &[Comment],
) -> Result<(), crate::store::StoreError> {
    let value = serde_json::to_value(comments)?;
    state.store.save_setting(keys::COMMENTS, &value).await
}

/// PATCH /api/db/comments { id, status } - approve or reject (auth required)
pub async fn moderate_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ModerateCommentRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }
    if payload.id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("id required")),
        )
            .into_response();
    }

    let all: Vec<Comment> = match load_comments(&state).await {
        Ok(all) => all
            .into_iter()
            .map(|mut c| {
                if c.id == payload.id {
                    c.status = payload.status;
                }
                c
            })
            .collect(),
        Err(e) => return storage_error(e).into_response(),
    };

    match save_comments(&state, &all).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// DELETE /api/db/comments?id=xxx (auth required)
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CommentListQuery>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("id required")),
        )
            .into_response();
    };

    let all: Vec<Comment> = match load_comments(&state).await {
        Ok(all) => all.into_iter().filter(|c| c.id != id).collect(),
        Err(e) => return storage_error(e).into_response(),
    };

    match save_comments(&state, &all).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}
