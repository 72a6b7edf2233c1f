/**
 * Cron Routes
 * Scheduled publishing: flips scheduled articles live once their
 * publish-at instant has passed
 */
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::is_authenticated;
use crate::routes::ErrorResponse;
use crate::state::AppState;
use crate::store::models::{ArticlePatch, ArticleStatus};
use crate::store::Store;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    pub published: usize,
    pub articles: Vec<PublishedArticle>,
}

/// External schedulers authenticate with `Authorization: Bearer
/// {CRON_SECRET}`; an admin cookie also works (the dashboard's "publish
/// now" button). Without a configured secret the endpoint stays open only
/// outside production.
fn authorize_cron(headers: &HeaderMap) -> bool {
    let cron_secret = std::env::var("CRON_SECRET").ok().filter(|s| !s.is_empty());
    if let Some(secret) = &cron_secret {
        let bearer = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if bearer == Some(format!("Bearer {}", secret).as_str()) {
            return true;
        }
    }
    if is_authenticated(headers) {
        return true;
    }
    cron_secret.is_none() && std::env::var("ENVIRONMENT").as_deref() != Ok("production")
}

// ============================================================================
// Handlers
// ============================================================================

/// POST|GET /api/cron/publish
/// Promote every scheduled article whose `scheduledPublishAt` is in the
/// past. GET exists for external cron services that only issue GETs.
pub async fn publish_scheduled(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorize_cron(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Unauthorized")),
        )
            .into_response();
    }

    let articles = match state.store.articles().await {
        Ok(articles) => articles,
        Err(e) => {
            tracing::error!("scheduled publish failed to load articles: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Storage error")),
            )
                .into_response();
        }
    };

    let now = Utc::now().to_rfc3339();
    let due: Vec<_> = articles
        .into_iter()
        .filter(|a| {
            a.status == ArticleStatus::Scheduled
                && a.scheduled_publish_at
                    .as_deref()
                    .map(|at| at <= now.as_str())
                    .unwrap_or(false)
        })
        .collect();

    let mut published = Vec::new();
    for article in due {
        let patch = ArticlePatch {
            status: Some(ArticleStatus::Published),
            ..ArticlePatch::default()
        };
        match state.store.update_article(&article.id, patch).await {
            Ok(()) => {
                tracing::info!(id = %article.id, title = %article.title, "scheduled article published");
                published.push(PublishedArticle {
                    id: article.id,
                    title: article.title,
                });
            }
            Err(e) => {
                tracing::error!(id = %article.id, "failed to publish scheduled article: {}", e);
            }
        }
    }

    (
        StatusCode::OK,
        Json(PublishResponse {
            success: true,
            published: published.len(),
            articles: published,
        }),
    )
        .into_response()
}
