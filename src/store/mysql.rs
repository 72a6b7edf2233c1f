//! MySQL store, used when `MYSQL_URL` is set.
//!
//! Schema is created on connect with `CREATE TABLE IF NOT EXISTS`
//! migrations. This is the only backend with an atomic view-counter
//! increment (`views = views + 1`).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{FromRow, QueryBuilder};

use super::models::{Article, ArticlePatch, ArticleStatus, DistributeLog, DistributeStatus, ViewLogEntry};
use super::{NewViewLog, Store, StoreError, DISTRIBUTE_LOG_CAP, VIEW_LOG_CAP};

/// Article list columns, body excluded.
const LIST_COLUMNS: &str = "id, title, category, date, status, views, '' AS body, thumbnail, \
     thumbnail_alt, tags, author, author_email, summary, slug, meta_description, og_image, \
     scheduled_publish_at, updated_at";

const ALL_COLUMNS: &str = "id, title, category, date, status, views, body, thumbnail, \
     thumbnail_alt, tags, author, author_email, summary, slug, meta_description, og_image, \
     scheduled_publish_at, updated_at";

pub struct MySqlStore {
    pool: MySqlPool,
}

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: String,
    title: String,
    category: String,
    date: NaiveDate,
    status: String,
    views: i64,
    body: Option<String>,
    thumbnail: Option<String>,
    thumbnail_alt: Option<String>,
    tags: Option<String>,
    author: Option<String>,
    author_email: Option<String>,
    summary: Option<String>,
    slug: Option<String>,
    meta_description: Option<String>,
    og_image: Option<String>,
    scheduled_publish_at: Option<String>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ArticleRow> for Article {
    fn from(r: ArticleRow) -> Self {
        Article {
            id: r.id,
            title: r.title,
            category: r.category,
            date: r.date.format("%Y-%m-%d").to_string(),
            status: ArticleStatus::parse_lossy(&r.status),
            views: r.views.max(0) as u64,
            body: r.body.unwrap_or_default(),
            thumbnail: r.thumbnail,
            thumbnail_alt: r.thumbnail_alt,
            tags: r.tags,
            author: r.author,
            author_email: r.author_email,
            summary: r.summary,
            slug: r.slug,
            meta_description: r.meta_description,
            og_image: r.og_image,
            scheduled_publish_at: r.scheduled_publish_at,
            updated_at: r.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| StoreError::InvalidDate(date.to_string()))
}

impl MySqlStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        tracing::info!("initializing MySQL connection pool...");

        let max_connections: u32 = std::env::var("DB_POOL_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        let store = Self { pool };
        store.run_migrations().await?;

        tracing::info!("MySQL connection pool ready");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        tracing::info!("running MySQL migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id VARCHAR(64) PRIMARY KEY,
                title TEXT NOT NULL,
                category VARCHAR(100) NOT NULL DEFAULT '뉴스',
                date DATE NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                views BIGINT NOT NULL DEFAULT 0,
                body MEDIUMTEXT,
                thumbnail TEXT,
                thumbnail_alt TEXT,
                tags TEXT,
                author VARCHAR(100),
                author_email VARCHAR(200),
                summary TEXT,
                slug VARCHAR(200),
                meta_description TEXT,
                og_image TEXT,
                scheduled_publish_at VARCHAR(40),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                    ON UPDATE CURRENT_TIMESTAMP,
                INDEX idx_articles_date (date DESC),
                INDEX idx_articles_status (status),
                INDEX idx_articles_category (category)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS site_settings (
                `key` VARCHAR(100) PRIMARY KEY,
                value MEDIUMTEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                    ON UPDATE CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS view_logs (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                article_id VARCHAR(64) NOT NULL,
                path VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_view_logs_created_at (created_at DESC)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS distribute_logs (
                id VARCHAR(64) PRIMARY KEY,
                article_id VARCHAR(64) NOT NULL,
                article_title TEXT NOT NULL,
                portal VARCHAR(50) NOT NULL,
                status VARCHAR(20) NOT NULL,
                message TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_distribute_logs_created_at (created_at DESC)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("MySQL migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn articles(&self) -> Result<Vec<Article>, StoreError> {
        let rows: Vec<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM articles ORDER BY date DESC, created_at DESC",
            LIST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    async fn article_by_id(&self, id: &str) -> Result<Option<Article>, StoreError> {
        let row: Option<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM articles WHERE id = ? LIMIT 1",
            ALL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Article::from))
    }

    async fn create_article(&self, a: Article) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO articles
                (id, title, category, date, status, views, body, thumbnail, thumbnail_alt,
                 tags, author, author_email, summary, slug, meta_description, og_image,
                 scheduled_publish_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&a.id)
        .bind(&a.title)
        .bind(&a.category)
        .bind(parse_date(&a.date)?)
        .bind(a.status.as_str())
        .bind(a.views as i64)
        .bind(&a.body)
        .bind(&a.thumbnail)
        .bind(&a.thumbnail_alt)
        .bind(&a.tags)
        .bind(&a.author)
        .bind(&a.author_email)
        .bind(&a.summary)
        .bind(&a.slug)
        .bind(&a.meta_description)
        .bind(&a.og_image)
        .bind(&a.scheduled_publish_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_article(&self, id: &str, patch: ArticlePatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<sqlx::MySql> = QueryBuilder::new("UPDATE articles SET ");
        let mut assignments = qb.separated(", ");

        macro_rules! set_str {
            ($field:ident, $col:literal) => {
                if let Some(v) = &patch.$field {
                    assignments.push(concat!($col, " = "));
                    assignments.push_bind_unseparated(v.clone());
                }
            };
        }
        set_str!(title, "title");
        set_str!(category, "category");
        set_str!(body, "body");
        set_str!(thumbnail, "thumbnail");
        set_str!(thumbnail_alt, "thumbnail_alt");
        set_str!(tags, "tags");
        set_str!(author, "author");
        set_str!(author_email, "author_email");
        set_str!(summary, "summary");
        set_str!(slug, "slug");
        set_str!(meta_description, "meta_description");
        set_str!(og_image, "og_image");
        set_str!(scheduled_publish_at, "scheduled_publish_at");
        if let Some(date) = &patch.date {
            assignments.push("date = ");
            assignments.push_bind_unseparated(parse_date(date)?);
        }
        if let Some(status) = patch.status {
            assignments.push("status = ");
            assignments.push_bind_unseparated(status.as_str());
        }
        if let Some(views) = patch.views {
            assignments.push("views = ");
            assignments.push_bind_unseparated(views as i64);
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_article(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_views(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE articles SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_view_log(&self, entry: NewViewLog) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO view_logs (article_id, path) VALUES (?, ?)")
            .bind(&entry.article_id)
            .bind(&entry.path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn view_logs(&self) -> Result<Vec<ViewLogEntry>, StoreError> {
        let rows: Vec<(String, String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(&format!(
            "SELECT article_id, path, created_at FROM view_logs \
             ORDER BY created_at DESC LIMIT {}",
            VIEW_LOG_CAP
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(article_id, path, created_at)| ViewLogEntry {
                article_id,
                path,
                timestamp: created_at.to_rfc3339(),
            })
            .collect())
    }

    async fn distribute_logs(&self) -> Result<Vec<DistributeLog>, StoreError> {
        let rows: Vec<(String, String, String, String, String, Option<String>, chrono::DateTime<chrono::Utc>)> =
            sqlx::query_as(&format!(
                "SELECT id, article_id, article_title, portal, status, message, created_at \
                 FROM distribute_logs ORDER BY created_at DESC LIMIT {}",
                DISTRIBUTE_LOG_CAP
            ))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |(id, article_id, article_title, portal, status, message, created_at)| {
                    DistributeLog {
                        id,
                        article_id,
                        article_title,
                        portal,
                        status: match status.as_str() {
                            "success" => DistributeStatus::Success,
                            "failed" => DistributeStatus::Failed,
                            _ => DistributeStatus::Pending,
                        },
                        timestamp: created_at.to_rfc3339(),
                        message: message.unwrap_or_default(),
                    }
                },
            )
            .collect())
    }

    async fn add_distribute_logs(&self, logs: Vec<DistributeLog>) -> Result<(), StoreError> {
        for log in logs {
            let status = match log.status {
                DistributeStatus::Success => "success",
                DistributeStatus::Failed => "failed",
                DistributeStatus::Pending => "pending",
            };
            sqlx::query(
                "INSERT INTO distribute_logs (id, article_id, article_title, portal, status, message) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&log.id)
            .bind(&log.article_id)
            .bind(&log.article_title)
            .bind(&log.portal)
            .bind(status)
            .bind(&log.message)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn clear_distribute_logs(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM distribute_logs")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM site_settings WHERE `key` = ? LIMIT 1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_setting(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO site_settings (`key`, value) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE value = VALUES(value)",
        )
        .bind(key)
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }
}
