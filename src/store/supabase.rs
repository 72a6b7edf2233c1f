//! Supabase (PostgREST) store, used when `SUPABASE_URL` and
//! `SUPABASE_ANON_KEY` are set.
//!
//! Reads go out with the anon key (public-read row-level security);
//! writes use `SUPABASE_SERVICE_KEY` when present. The view-counter
//! increment is a read-then-patch and can lose concurrent updates.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::models::{Article, ArticlePatch, DistributeLog, ViewLogEntry};
use super::{
    patch_to_remote_json, NewViewLog, RemoteArticleRow, Store, StoreError, DISTRIBUTE_LOG_CAP,
    VIEW_LOG_CAP,
};

/// Article list columns, body excluded.
const LIST_COLUMNS: &str = "id,title,category,date,status,views,thumbnail,thumbnail_alt,tags,\
     author,author_email,summary,slug,meta_description,og_image,scheduled_publish_at,updated_at";

pub struct SupabaseStore {
    base_url: String,
    anon_key: String,
    service_key: Option<String>,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, service_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_key,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("SUPABASE_URL").unwrap_or_default(),
            std::env::var("SUPABASE_ANON_KEY").unwrap_or_default(),
            std::env::var("SUPABASE_SERVICE_KEY").ok(),
        )
    }

    fn headers(&self, write: bool) -> HeaderMap {
        let key = if write {
            self.service_key.as_deref().unwrap_or(&self.anon_key)
        } else {
            &self.anon_key
        };
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(key) {
            headers.insert("apikey", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", key)) {
            headers.insert(reqwest::header::AUTHORIZATION, v);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "Prefer",
            HeaderValue::from_static(if write {
                "return=minimal"
            } else {
                "return=representation"
            }),
        );
        headers
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{}?{}", self.base_url, table, query)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<T, StoreError> {
        let resp = self
            .client
            .get(self.rest_url(table, query))
            .headers(self.headers(false))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl Store for SupabaseStore {
    async fn articles(&self) -> Result<Vec<Article>, StoreError> {
        let rows: Vec<RemoteArticleRow> = self
            .get_rows(
                "articles",
                &format!("select={}&order=date.desc,created_at.desc", LIST_COLUMNS),
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.into_article(false)).collect())
    }

    async fn article_by_id(&self, id: &str) -> Result<Option<Article>, StoreError> {
        let rows: Vec<RemoteArticleRow> = self
            .get_rows(
                "articles",
                &format!("id=eq.{}&select=*&limit=1", urlencode(id)),
            )
            .await?;
        Ok(rows.into_iter().next().map(|r| r.into_article(true)))
    }

    async fn create_article(&self, article: Article) -> Result<(), StoreError> {
        let row = RemoteArticleRow::from_article(&article);
        let resp = self
            .client
            .post(self.rest_url("articles", "select=id"))
            .headers(self.headers(true))
            .json(&row)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn update_article(&self, id: &str, patch: ArticlePatch) -> Result<(), StoreError> {
        let body = patch_to_remote_json(&patch);
        if body.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .patch(self.rest_url("articles", &format!("id=eq.{}", urlencode(id))))
            .headers(self.headers(true))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_article(&self, id: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .delete(self.rest_url("articles", &format!("id=eq.{}", urlencode(id))))
            .headers(self.headers(true))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn increment_views(&self, id: &str) -> Result<(), StoreError> {
        // Read-then-patch; concurrent increments may lose updates.
        let rows: Vec<Value> = self
            .get_rows(
                "articles",
                &format!("id=eq.{}&select=views&limit=1", urlencode(id)),
            )
            .await?;
        let Some(current) = rows.first().and_then(|r| r["views"].as_i64()) else {
            return Ok(());
        };
        let resp = self
            .client
            .patch(self.rest_url("articles", &format!("id=eq.{}", urlencode(id))))
            .headers(self.headers(true))
            .json(&serde_json::json!({ "views": current + 1 }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn add_view_log(&self, entry: NewViewLog) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.rest_url("view_logs", "select=article_id"))
            .headers(self.headers(true))
            .json(&serde_json::json!({
                "article_id": entry.article_id,
                "path": entry.path,
            }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn view_logs(&self) -> Result<Vec<ViewLogEntry>, StoreError> {
        let rows: Vec<Value> = self
            .get_rows(
                "view_logs",
                &format!(
                    "select=article_id,path,created_at&order=created_at.desc&limit={}",
                    VIEW_LOG_CAP
                ),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| ViewLogEntry {
                article_id: r["article_id"].as_str().unwrap_or_default().to_string(),
                path: r["path"].as_str().unwrap_or_default().to_string(),
                timestamp: r["created_at"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn distribute_logs(&self) -> Result<Vec<DistributeLog>, StoreError> {
        let rows: Vec<Value> = self
            .get_rows(
                "distribute_logs",
                &format!("select=*&order=created_at.desc&limit={}", DISTRIBUTE_LOG_CAP),
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(DistributeLog {
                    id: r["id"].as_str()?.to_string(),
                    article_id: r["article_id"].as_str().unwrap_or_default().to_string(),
                    article_title: r["article_title"].as_str().unwrap_or_default().to_string(),
                    portal: r["portal"].as_str().unwrap_or_default().to_string(),
                    status: serde_json::from_value(r["status"].clone()).ok()?,
                    timestamp: r["created_at"].as_str().unwrap_or_default().to_string(),
                    message: r["message"].as_str().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn add_distribute_logs(&self, logs: Vec<DistributeLog>) -> Result<(), StoreError> {
        if logs.is_empty() {
            return Ok(());
        }
        let rows: Vec<Value> = logs
            .iter()
            .map(|l| {
                serde_json::json!({
                    "id": l.id,
                    "article_id": l.article_id,
                    "article_title": l.article_title,
                    "portal": l.portal,
                    "status": l.status,
                    "message": l.message,
                })
            })
            .collect();
        let resp = self
            .client
            .post(self.rest_url("distribute_logs", "select=id"))
            .headers(self.headers(true))
            .json(&rows)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn clear_distribute_logs(&self) -> Result<(), StoreError> {
        // PostgREST needs a filter; match every non-null id.
        let resp = self
            .client
            .delete(self.rest_url("distribute_logs", "id=not.is.null"))
            .headers(self.headers(true))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let rows: Vec<Value> = self
            .get_rows(
                "site_settings",
                &format!("key=eq.{}&select=value&limit=1", urlencode(key)),
            )
            .await?;
        Ok(rows.into_iter().next().map(|r| r["value"].clone()))
    }

    async fn save_setting(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut headers = self.headers(true);
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let resp = self
            .client
            .post(self.rest_url("site_settings", "on_conflict=key"))
            .headers(headers)
            .json(&serde_json::json!({ "key": key, "value": value }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let rows: Result<Vec<Value>, StoreError> =
            self.get_rows("site_settings", "select=key&limit=1").await;
        rows.map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}

/// Percent-encode a value for use inside a PostgREST filter.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode_passes_safe_chars() {
        assert_eq!(urlencode("abc-123_x.y~z"), "abc-123_x.y~z");
    }

    #[test]
    fn test_urlencode_escapes_reserved() {
        assert_eq!(urlencode("a b&c"), "a%20b%26c");
        assert_eq!(urlencode("뉴스"), "%EB%89%B4%EC%8A%A4");
    }

    #[test]
    fn test_write_headers_prefer_service_key() {
        let store = SupabaseStore::new(
            "https://example.supabase.co/",
            "anon",
            Some("service".to_string()),
        );
        let headers = store.headers(true);
        assert_eq!(headers.get("apikey").unwrap(), "service");
        let read_headers = store.headers(false);
        assert_eq!(read_headers.get("apikey").unwrap(), "anon");
        assert_eq!(store.base_url, "https://example.supabase.co");
    }
}
