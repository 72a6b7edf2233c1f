/**
 * Article Routes
 * Admin CRUD over the article store, plus the public view counter
 */
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::require_admin;
use crate::routes::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use crate::store::models::{Article, ArticlePatch};
use crate::store::Store;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/db/articles
#[derive(Debug, Default, Deserialize)]
pub struct ArticleListQuery {
    pub id: Option<String>,
    /// Case-insensitive match against title, author, and tags
    pub q: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleListResponse {
    pub success: bool,
    pub articles: Vec<Article>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SingleArticleResponse {
    pub success: bool,
    pub article: Option<Article>,
}

/// Body for PATCH /api/db/articles: id plus any subset of article fields
#[derive(Debug, Deserialize)]
pub struct UpdateArticleRequest {
    pub id: String,
    #[serde(flatten)]
    pub patch: ArticlePatch,
}

#[derive(Debug, Deserialize)]
pub struct ArticleIdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IncrementViewsRequest {
    pub id: String,
}

fn storage_error(e: crate::store::StoreError) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("article store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Storage error")),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/db/articles - list with filters and optional pagination, or a
/// single article when `id` is given (auth required)
pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ArticleListQuery>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    if let Some(id) = &query.id {
        return match state.store.article_by_id(id).await {
            Ok(article) => (
                StatusCode::OK,
                Json(SingleArticleResponse {
                    success: true,
                    article,
                }),
            )
                .into_response(),
            Err(e) => storage_error(e).into_response(),
        };
    }

    let mut articles = match state.store.articles().await {
        Ok(articles) => articles,
        Err(e) => return storage_error(e).into_response(),
    };

    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let q = q.to_lowercase();
        articles.retain(|a| {
            a.title.to_lowercase().contains(&q)
                || a.author
                    .as_deref()
                    .map(|v| v.to_lowercase().contains(&q))
                    .unwrap_or(false)
                || a.tags
                    .as_deref()
                    .map(|v| v.to_lowercase().contains(&q))
                    .unwrap_or(false)
        });
    }
    if let Some(category) = &query.category {
        articles.retain(|a| &a.category == category);
    }
    if let Some(status) = &query.status {
        articles.retain(|a| a.status.as_str() == status);
    }

    let total = articles.len();

    // Pagination kicks in as soon as either parameter shows up.
    if query.page.is_some() || query.limit.is_some() {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = ((page - 1) * limit) as usize;
        articles = articles
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();
        return (
            StatusCode::OK,
            Json(ArticleListResponse {
                success: true,
                articles,
                total,
                page: Some(page),
                limit: Some(limit),
            }),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(ArticleListResponse {
            success: true,
            articles,
            total,
            page: None,
            limit: None,
        }),
    )
        .into_response()
}

/// POST /api/db/articles - create an article (auth required)
pub async fn create_article(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(article): Json<Article>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    if article.id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("id required")),
        )
            .into_response();
    }
    if article.title.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Title is required")),
        )
            .into_response();
    }

    match state.store.create_article(article).await {
        Ok(()) => (StatusCode::CREATED, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// PATCH /api/db/articles - merge a partial update into an article
/// (auth required)
pub async fn update_article(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateArticleRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers) {
        return err.into_response();
    }

    if payload.id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("id required")),
        )
            .into_response();
    }

    match state.store.update_article(&payload.id, payload.patch).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// DELETE /api/db/articles?id=xxx (auth required)
pub async fn delete_article(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ArticleIdQuery>,
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

    match state.store.delete_article(&id).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

/// POST /api/db/articles/views - public view-counter increment.
/// Anonymous visitors record views, so no auth here.
pub async fn increment_views(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IncrementViewsRequest>,
) -> impl IntoResponse {
    if payload.id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("id required")),
        )
            .into_response();
    }

    match state.store.increment_views(&payload.id).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse::ok())).into_response(),
        Err(e) => storage_error(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_auth_token;
    use crate::store::file::FileStore;
    use crate::store::models::ArticleStatus;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> Router {
        let state = AppState::with_store(Arc::new(FileStore::new(dir)));
        Router::new()
            .route(
                "/api/db/articles",
                axum::routing::get(list_articles)
                    .post(create_article)
                    .patch(update_article)
                    .delete(delete_article),
            )
            .route("/api/db/articles/views", post(increment_views))
            .with_state(state)
    }

    fn admin_cookie() -> String {
        format!("cp-admin-auth={}", generate_auth_token())
    }

    fn article_json(id: &str, date: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": format!("기사 {}", id),
            "category": "뉴스",
            "date": date,
            "status": status,
            "views": 0,
            "body": "<p>본문</p>",
        })
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
        authed: bool,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if authed {
            builder = builder.header("cookie", admin_cookie());
        }
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&v).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_list_requires_auth() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let (status, _) = send(&app, "GET", "/api/db/articles", None, false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_crud_flow() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _) = send(
            &app,
            "POST",
            "/api/db/articles",
            Some(article_json("a1", "2024-01-01", "published")),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "GET", "/api/db/articles", None, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["articles"][0]["id"], "a1");

        let (status, _) = send(
            &app,
            "PATCH",
            "/api/db/articles",
            Some(serde_json::json!({"id": "a1", "title": "수정된 제목"})),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", "/api/db/articles?id=a1", None, true).await;
        assert_eq!(body["article"]["title"], "수정된 제목");
        assert_eq!(body["article"]["body"], "<p>본문</p>");

        let (status, _) = send(&app, "DELETE", "/api/db/articles?id=a1", None, true).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", "/api/db/articles?id=a1", None, true).await;
        assert!(body["article"].is_null());
    }

    #[tokio::test]
    async fn test_create_validates_required_fields() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let mut missing_title = article_json("a1", "2024-01-01", "draft");
        missing_title["title"] = serde_json::json!("  ");
        let (status, _) = send(&app, "POST", "/api/db/articles", Some(missing_title), true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        for (id, date, status) in [
            ("a1", "2024-01-01", "published"),
            ("a2", "2024-01-02", "draft"),
            ("a3", "2024-01-03", "published"),
        ] {
            let mut body = article_json(id, date, status);
            if id == "a3" {
                body["category"] = serde_json::json!("스포츠");
            }
            send(&app, "POST", "/api/db/articles", Some(body), true).await;
        }

        let (_, body) = send(&app, "GET", "/api/db/articles?status=published", None, true).await;
        assert_eq!(body["total"], 2);

        // "스포츠", percent-encoded
        let (_, body) = send(
            &app,
            "GET",
            "/api/db/articles?category=%EC%8A%A4%ED%8F%AC%EC%B8%A0",
            None,
            true,
        )
        .await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["articles"][0]["id"], "a3");

        let (_, body) = send(&app, "GET", "/api/db/articles?page=2&limit=2", None, true).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["articles"].as_array().unwrap().len(), 1);
        assert_eq!(body["page"], 2);

        let (_, body) = send(&app, "GET", "/api/db/articles?q=A2", None, true).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["articles"][0]["id"], "a2");
    }

    #[tokio::test]
    async fn test_views_endpoint_is_public_and_increments() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        send(
            &app,
            "POST",
            "/api/db/articles",
            Some(article_json("a1", "2024-01-01", "published")),
            true,
        )
        .await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/db/articles/views",
            Some(serde_json::json!({"id": "a1"})),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", "/api/db/articles?id=a1", None, true).await;
        assert_eq!(body["article"]["views"], 1);
    }
}
