//! Storage layer: one `Store` trait, four backends.
//!
//! The active backend is chosen once at startup from the environment, in
//! fixed precedence order: HTTP gateway, then MySQL, then Supabase, then
//! local JSON files. Every logical table (articles, settings, view logs,
//! distribute logs) lives in the selected backend for the life of the
//! process.

pub mod file;
pub mod gateway;
pub mod models;
pub mod mysql;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use models::{Article, ArticlePatch, DistributeLog, ViewLogEntry};

/// Retention cap for view logs; oldest entries are trimmed on write.
pub const VIEW_LOG_CAP: usize = 10_000;

/// Retention cap for distribute logs.
pub const DISTRIBUTE_LOG_CAP: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// A new view-log entry; the store stamps the timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewViewLog {
    pub article_id: String,
    pub path: String,
}

/// The storage contract every backend implements.
///
/// List results come back date-descending with bodies omitted. Updates are
/// merge patches; updating or incrementing an unknown id is a no-op.
/// `increment_views` is atomic only on MySQL; the file and Supabase paths
/// are read-modify-write and concurrent increments may lose updates.
#[async_trait]
pub trait Store: Send + Sync {
    async fn articles(&self) -> Result<Vec<Article>, StoreError>;
    async fn article_by_id(&self, id: &str) -> Result<Option<Article>, StoreError>;
    async fn create_article(&self, article: Article) -> Result<(), StoreError>;
    async fn update_article(&self, id: &str, patch: ArticlePatch) -> Result<(), StoreError>;
    async fn delete_article(&self, id: &str) -> Result<(), StoreError>;
    async fn increment_views(&self, id: &str) -> Result<(), StoreError>;

    async fn add_view_log(&self, entry: NewViewLog) -> Result<(), StoreError>;
    async fn view_logs(&self) -> Result<Vec<ViewLogEntry>, StoreError>;

    async fn distribute_logs(&self) -> Result<Vec<DistributeLog>, StoreError>;
    async fn add_distribute_logs(&self, logs: Vec<DistributeLog>) -> Result<(), StoreError>;
    async fn clear_distribute_logs(&self) -> Result<(), StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn save_setting(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Human-readable backend name for health/diagnostics output.
    fn backend_name(&self) -> &'static str;
}

/// Which backend the environment selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gateway,
    MySql,
    Supabase,
    File,
}

impl BackendKind {
    /// Fixed precedence: gateway > MySQL > Supabase > file.
    pub fn select(gateway: bool, mysql: bool, supabase: bool) -> Self {
        if gateway {
            BackendKind::Gateway
        } else if mysql {
            BackendKind::MySql
        } else if supabase {
            BackendKind::Supabase
        } else {
            BackendKind::File
        }
    }

    pub fn from_env() -> Self {
        Self::select(
            std::env::var("GATEWAY_API_URL").is_ok(),
            std::env::var("MYSQL_URL").is_ok(),
            std::env::var("SUPABASE_URL").is_ok() && std::env::var("SUPABASE_ANON_KEY").is_ok(),
        )
    }
}

/// Build the store the environment selects. A MySQL connection failure
/// degrades to the file store so the service still comes up; the error is
/// logged loudly and surfaced by `/health/detailed`.
pub async fn connect_from_env() -> Arc<dyn Store> {
    match BackendKind::from_env() {
        BackendKind::Gateway => {
            tracing::info!("storage backend: HTTP gateway");
            Arc::new(gateway::GatewayStore::from_env())
        }
        BackendKind::MySql => {
            let url = std::env::var("MYSQL_URL").unwrap_or_default();
            match mysql::MySqlStore::connect(&url).await {
                Ok(store) => {
                    tracing::info!("storage backend: MySQL");
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::error!(
                        "failed to connect to MySQL: {}. Falling back to the local file store.",
                        e
                    );
                    Arc::new(file::FileStore::from_env())
                }
            }
        }
        BackendKind::Supabase => {
            tracing::info!("storage backend: Supabase REST");
            Arc::new(supabase::SupabaseStore::from_env())
        }
        BackendKind::File => {
            tracing::info!("storage backend: local JSON files");
            Arc::new(file::FileStore::from_env())
        }
    }
}

/// Article row as the remote backends (gateway, Supabase) exchange it:
/// snake_case columns, nullable everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RemoteArticleRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnail_alt: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub og_image: Option<String>,
    #[serde(default)]
    pub scheduled_publish_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn none_if_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

impl RemoteArticleRow {
    pub fn into_article(self, include_body: bool) -> Article {
        Article {
            id: self.id,
            title: self.title,
            category: self.category.unwrap_or_else(|| "뉴스".to_string()),
            // Dates may arrive as full datetimes; keep the date part only.
            date: {
                let d = self.date.unwrap_or_default();
                d.chars().take(10).collect()
            },
            status: models::ArticleStatus::parse_lossy(self.status.as_deref().unwrap_or("")),
            views: self.views.unwrap_or(0).max(0) as u64,
            body: if include_body {
                self.body.unwrap_or_default()
            } else {
                String::new()
            },
            thumbnail: none_if_empty(self.thumbnail),
            thumbnail_alt: none_if_empty(self.thumbnail_alt),
            tags: none_if_empty(self.tags),
            author: none_if_empty(self.author),
            author_email: none_if_empty(self.author_email),
            summary: none_if_empty(self.summary),
            slug: none_if_empty(self.slug),
            meta_description: none_if_empty(self.meta_description),
            og_image: none_if_empty(self.og_image),
            scheduled_publish_at: none_if_empty(self.scheduled_publish_at),
            updated_at: none_if_empty(self.updated_at),
        }
    }

    pub fn from_article(a: &Article) -> Self {
        Self {
            id: a.id.clone(),
            title: a.title.clone(),
            category: Some(a.category.clone()),
            date: Some(a.date.clone()),
            status: Some(a.status.as_str().to_string()),
            views: Some(a.views as i64),
            body: Some(a.body.clone()),
            thumbnail: a.thumbnail.clone(),
            thumbnail_alt: a.thumbnail_alt.clone(),
            tags: a.tags.clone(),
            author: a.author.clone(),
            author_email: a.author_email.clone(),
            summary: a.summary.clone(),
            slug: a.slug.clone(),
            meta_description: a.meta_description.clone(),
            og_image: a.og_image.clone(),
            scheduled_publish_at: a.scheduled_publish_at.clone(),
            updated_at: a.updated_at.clone(),
        }
    }
}

/// Render a patch as the snake_case JSON object the remote backends accept.
pub(crate) fn patch_to_remote_json(patch: &ArticlePatch) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    macro_rules! put {
        ($field:ident, $col:expr) => {
            if let Some(v) = &patch.$field {
                map.insert($col.to_string(), Value::String(v.clone()));
            }
        };
    }
    put!(title, "title");
    put!(category, "category");
    put!(date, "date");
    put!(body, "body");
    put!(thumbnail, "thumbnail");
    put!(thumbnail_alt, "thumbnail_alt");
    put!(tags, "tags");
    put!(author, "author");
    put!(author_email, "author_email");
    put!(summary, "summary");
    put!(slug, "slug");
    put!(meta_description, "meta_description");
    put!(og_image, "og_image");
    put!(scheduled_publish_at, "scheduled_publish_at");
    put!(updated_at, "updated_at");
    if let Some(status) = patch.status {
        map.insert("status".to_string(), Value::String(status.as_str().to_string()));
    }
    if let Some(views) = patch.views {
        map.insert("views".to_string(), Value::Number(views.into()));
    }
    map
}
