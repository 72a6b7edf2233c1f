//! HTTP gateway store, used when `GATEWAY_API_URL` is set.
//!
//! The gateway is a single-endpoint JSON bridge in front of the hosting
//! provider's MySQL (deployments whose egress IPs the provider blocks
//! cannot connect directly). Every call is
//! `{GATEWAY_API_URL}?action=<table>` with a Bearer secret; an optional
//! `GATEWAY_API_HOST` header supports virtual-host routing when the
//! gateway is addressed by IP.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::models::{Article, ArticlePatch, DistributeLog, ViewLogEntry};
use super::{patch_to_remote_json, NewViewLog, RemoteArticleRow, Store, StoreError};

const GATEWAY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(8);

pub struct GatewayStore {
    url: String,
    secret: String,
    host_override: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ArticlesEnvelope {
    #[serde(default)]
    articles: Vec<RemoteArticleRow>,
}

#[derive(Debug, Deserialize)]
struct ArticleEnvelope {
    #[serde(default)]
    article: Option<RemoteArticleRow>,
}

#[derive(Debug, Deserialize)]
struct LogsEnvelope<T> {
    #[serde(default = "Vec::new")]
    logs: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ValueEnvelope {
    #[serde(default)]
    value: Option<Value>,
}

impl GatewayStore {
    pub fn new(url: impl Into<String>, secret: impl Into<String>, host_override: Option<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
            host_override,
            client: reqwest::Client::builder()
                .timeout(GATEWAY_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("GATEWAY_API_URL").unwrap_or_default(),
            std::env::var("GATEWAY_API_SECRET").unwrap_or_default(),
            std::env::var("GATEWAY_API_HOST").ok(),
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        method: Method,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<T, StoreError> {
        let mut req = self
            .client
            .request(method, &self.url)
            .query(&[("action", action)])
            .query(params)
            .bearer_auth(&self.secret);
        if let Some(host) = &self.host_override {
            req = req.header(reqwest::header::HOST, host);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Store for GatewayStore {
    async fn articles(&self) -> Result<Vec<Article>, StoreError> {
        let data: ArticlesEnvelope = self.call("articles", Method::GET, &[], None).await?;
        Ok(data
            .articles
            .into_iter()
            .map(|r| r.into_article(false))
            .collect())
    }

    async fn article_by_id(&self, id: &str) -> Result<Option<Article>, StoreError> {
        let data: ArticleEnvelope = self
            .call("articles", Method::GET, &[("id", id)], None)
            .await?;
        Ok(data.article.map(|r| r.into_article(true)))
    }

    async fn create_article(&self, article: Article) -> Result<(), StoreError> {
        let row = serde_json::to_value(RemoteArticleRow::from_article(&article))?;
        let _: Value = self
            .call("articles", Method::POST, &[], Some(&row))
            .await?;
        Ok(())
    }

    async fn update_article(&self, id: &str, patch: ArticlePatch) -> Result<(), StoreError> {
        let mut body = patch_to_remote_json(&patch);
        body.insert("id".to_string(), Value::String(id.to_string()));
        let _: Value = self
            .call("articles", Method::PATCH, &[], Some(&Value::Object(body)))
            .await?;
        Ok(())
    }

    async fn delete_article(&self, id: &str) -> Result<(), StoreError> {
        let _: Value = self
            .call("articles", Method::DELETE, &[("id", id)], None)
            .await?;
        Ok(())
    }

    async fn increment_views(&self, id: &str) -> Result<(), StoreError> {
        let body = serde_json::json!({ "id": id });
        let _: Value = self
            .call("article-views", Method::POST, &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn add_view_log(&self, entry: NewViewLog) -> Result<(), StoreError> {
        let body = serde_json::to_value(&entry)?;
        let _: Value = self.call("view-logs", Method::POST, &[], Some(&body)).await?;
        Ok(())
    }

    async fn view_logs(&self) -> Result<Vec<ViewLogEntry>, StoreError> {
        let data: LogsEnvelope<ViewLogEntry> =
            self.call("view-logs", Method::GET, &[], None).await?;
        Ok(data.logs)
    }

    async fn distribute_logs(&self) -> Result<Vec<DistributeLog>, StoreError> {
        let data: LogsEnvelope<DistributeLog> =
            self.call("distribute-logs", Method::GET, &[], None).await?;
        Ok(data.logs)
    }

    async fn add_distribute_logs(&self, logs: Vec<DistributeLog>) -> Result<(), StoreError> {
        let body = serde_json::json!({ "logs": logs });
        let _: Value = self
            .call("distribute-logs", Method::POST, &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn clear_distribute_logs(&self) -> Result<(), StoreError> {
        let _: Value = self
            .call("distribute-logs", Method::DELETE, &[], None)
            .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let data: ValueEnvelope = self
            .call("settings", Method::GET, &[("key", key)], None)
            .await?;
        Ok(data.value.filter(|v| !v.is_null()))
    }

    async fn save_setting(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let body = serde_json::json!({ "key": key, "value": value });
        let _: Value = self.call("settings", Method::PUT, &[], Some(&body)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _: ValueEnvelope = self
            .call("settings", Method::GET, &[("key", "cp-health-probe")], None)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gateway"
    }
}
