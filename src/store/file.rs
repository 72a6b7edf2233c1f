//! Local JSON file store, used when no remote backend is configured.
//!
//! Each logical table is one pretty-printed JSON file under the data
//! directory (`articles.json`, `settings.json`, `view-logs.json`,
//! `distribute-logs.json`). File reads and rewrites are serialized by an
//! internal lock so a reader can never observe a half-written file;
//! read-modify-write sequences release the lock in between, so they still
//! race and the last write wins.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::models::{Article, ArticlePatch, DistributeLog, ViewLogEntry};
use super::{NewViewLog, Store, StoreError, DISTRIBUTE_LOG_CAP, VIEW_LOG_CAP};

pub struct FileStore {
    dir: PathBuf,
    io_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            io_lock: Mutex::new(()),
        }
    }

    /// Data directory from `DATA_DIR`, defaulting to `data/` under the
    /// working directory.
    pub fn from_env() -> Self {
        Self::new(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Read a whole table; a missing file is an empty table, a corrupt
    /// file is an error.
    async fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let _guard = self.io_lock.lock().await;
        let path = self.table_path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_table<T: Serialize>(&self, name: &str, data: &T) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(self.table_path(name), bytes).await?;
        Ok(())
    }

    async fn read_articles(&self) -> Result<Vec<Article>, StoreError> {
        Ok(self.read_table("articles").await?.unwrap_or_default())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn articles(&self) -> Result<Vec<Article>, StoreError> {
        let mut articles = self.read_articles().await?;
        articles.sort_by(|a, b| b.date.cmp(&a.date));
        for a in &mut articles {
            a.body = String::new();
        }
        Ok(articles)
    }

    async fn article_by_id(&self, id: &str) -> Result<Option<Article>, StoreError> {
        Ok(self.read_articles().await?.into_iter().find(|a| a.id == id))
    }

    async fn create_article(&self, article: Article) -> Result<(), StoreError> {
        let mut articles = self.read_articles().await?;
        articles.push(article);
        self.write_table("articles", &articles).await
    }

    async fn update_article(&self, id: &str, patch: ArticlePatch) -> Result<(), StoreError> {
        let mut articles = self.read_articles().await?;
        if let Some(article) = articles.iter_mut().find(|a| a.id == id) {
            patch.apply(article);
            self.write_table("articles", &articles).await?;
        }
        Ok(())
    }

    async fn delete_article(&self, id: &str) -> Result<(), StoreError> {
        let mut articles = self.read_articles().await?;
        articles.retain(|a| a.id != id);
        self.write_table("articles", &articles).await
    }

    async fn increment_views(&self, id: &str) -> Result<(), StoreError> {
        let mut articles = self.read_articles().await?;
        if let Some(article) = articles.iter_mut().find(|a| a.id == id) {
            article.views += 1;
            self.write_table("articles", &articles).await?;
        }
        Ok(())
    }

    async fn add_view_log(&self, entry: NewViewLog) -> Result<(), StoreError> {
        let mut logs: Vec<ViewLogEntry> = self.read_table("view-logs").await?.unwrap_or_default();
        logs.insert(
            0,
            ViewLogEntry {
                article_id: entry.article_id,
                path: entry.path,
                timestamp: Utc::now().to_rfc3339(),
            },
        );
        logs.truncate(VIEW_LOG_CAP);
        self.write_table("view-logs", &logs).await
    }

    async fn view_logs(&self) -> Result<Vec<ViewLogEntry>, StoreError> {
        Ok(self.read_table("view-logs").await?.unwrap_or_default())
    }

    async fn distribute_logs(&self) -> Result<Vec<DistributeLog>, StoreError> {
        let mut logs: Vec<DistributeLog> =
            self.read_table("distribute-logs").await?.unwrap_or_default();
        logs.truncate(DISTRIBUTE_LOG_CAP);
        Ok(logs)
    }

    async fn add_distribute_logs(&self, logs: Vec<DistributeLog>) -> Result<(), StoreError> {
        let existing: Vec<DistributeLog> =
            self.read_table("distribute-logs").await?.unwrap_or_default();
        let mut merged = logs;
        merged.extend(existing);
        merged.truncate(DISTRIBUTE_LOG_CAP);
        self.write_table("distribute-logs", &merged).await
    }

    async fn clear_distribute_logs(&self) -> Result<(), StoreError> {
        self.write_table("distribute-logs", &Vec::<DistributeLog>::new())
            .await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let all: serde_json::Map<String, Value> =
            self.read_table("settings").await?.unwrap_or_default();
        Ok(all.get(key).cloned())
    }

    async fn save_setting(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut all: serde_json::Map<String, Value> =
            self.read_table("settings").await?.unwrap_or_default();
        all.insert(key.to_string(), value.clone());
        self.write_table("settings", &all).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        // The data directory may legitimately not exist yet; creating it is
        // the same check a write would perform.
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
