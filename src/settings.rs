//! Cached site-settings accessor.
//!
//! Wraps whichever store the environment selected with a per-key TTL cache:
//! 300 seconds for slow-moving keys (anything containing "seo" or
//! "categories"), 60 seconds otherwise. Reads mask backend failures — a
//! stale cached value is served if one exists, the caller's fallback
//! otherwise — so a storage outage degrades page configuration instead of
//! breaking rendering. Writes go straight through to the store and do NOT
//! invalidate the read cache; readers may observe the previous value for up
//! to one TTL after a save.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::Store;

/// Well-known settings keys. Anything else goes through the raw `Value`
/// accessors unchanged.
pub mod keys {
    pub const ADMIN_ACCOUNTS: &str = "cp-admin-accounts";
    pub const SEO: &str = "cp-seo-settings";
    pub const FEED: &str = "cp-rss-settings";
    pub const CATEGORIES: &str = "cp-categories";
    pub const COMMENTS: &str = "cp-comments";
    pub const NEWSLETTER_SUBSCRIBERS: &str = "cp-newsletter-subscribers";
    pub const NEWSLETTER_SETTINGS: &str = "cp-newsletter-settings";
}

/// Category labels used until the `cp-categories` key overrides them.
pub const DEFAULT_CATEGORIES: &[&str] = &["뉴스", "연예", "스포츠", "문화", "라이프", "포토"];

const SLOW_TTL: Duration = Duration::from_secs(300);
const FAST_TTL: Duration = Duration::from_secs(60);

/// Site SEO settings (`cp-seo-settings`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
}

/// Syndication feed settings (`cp-rss-settings`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atom_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_feed_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_feeds: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<bool>,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

pub struct SettingsCache {
    store: Arc<dyn Store>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

/// TTL for a settings key; SEO and category data changes rarely and gets
/// the longer window.
fn ttl_for(key: &str) -> Duration {
    if key.contains("seo") || key.contains("categories") {
        SLOW_TTL
    } else {
        FAST_TTL
    }
}

impl SettingsCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Read a setting as raw JSON, applying the TTL cache and the
    /// mask-failures policy described on the module.
    pub async fn get_value(&self, key: &str, fallback: Value) -> Value {
        let ttl = ttl_for(key);

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if Instant::now() < entry.expires_at {
                    return entry.value.clone();
                }
            }
        }

        match self.store.get_setting(key).await {
            Ok(Some(value)) => {
                let mut entries = self.entries.write().await;
                entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                value
            }
            // Key absent: hand back the caller's fallback without caching
            // it, so the first write becomes visible immediately.
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "settings read failed, serving fallback");
                let entries = self.entries.read().await;
                match entries.get(key) {
                    Some(stale) => stale.value.clone(),
                    None => fallback,
                }
            }
        }
    }

    /// Typed read for the known keys; falls back on any shape mismatch.
    pub async fn get<T>(&self, key: &str, fallback: T) -> T
    where
        T: DeserializeOwned + Serialize,
    {
        let fallback_value = serde_json::to_value(&fallback).unwrap_or(Value::Null);
        let value = self.get_value(key, fallback_value).await;
        serde_json::from_value(value).unwrap_or(fallback)
    }

    /// Write through to the store. The read cache is intentionally left
    /// untouched; staleness up to one TTL is the documented consistency
    /// window.
    pub async fn save(
        &self,
        key: &str,
        value: &(impl Serialize + ?Sized),
    ) -> Result<(), crate::store::StoreError> {
        let value = serde_json::to_value(value)?;
        self.store.save_setting(key, &value).await
    }

    /// Rewind a cache entry past its TTL (test hook for the
    /// eventual-consistency window).
    #[cfg(test)]
    pub async fn expire(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileStore;
    use crate::store::{NewViewLog, StoreError};
    use async_trait::async_trait;

    #[test]
    fn test_ttl_tiers() {
        assert_eq!(ttl_for("cp-seo-settings"), SLOW_TTL);
        assert_eq!(ttl_for("cp-categories"), SLOW_TTL);
        assert_eq!(ttl_for("cp-rss-settings"), FAST_TTL);
        assert_eq!(ttl_for("cp-admin-accounts"), FAST_TTL);
    }

    fn file_cache(dir: &std::path::Path) -> SettingsCache {
        SettingsCache::new(Arc::new(FileStore::new(dir)))
    }

    #[tokio::test]
    async fn test_missing_key_returns_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path());
        let value = cache
            .get_value("cp-unknown", serde_json::json!({"x": 1}))
            .await;
        assert_eq!(value["x"], 1);
    }

    #[tokio::test]
    async fn test_save_then_get_is_eventually_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path());

        cache
            .save(keys::SEO, &serde_json::json!({"ogTitle": "처음"}))
            .await
            .unwrap();

        // Prime the cache with the first value.
        let first = cache.get_value(keys::SEO, Value::Null).await;
        assert_eq!(first["ogTitle"], "처음");

        // Write through; the cache is not invalidated, so a read within the
        // TTL still sees the old value.
        cache
            .save(keys::SEO, &serde_json::json!({"ogTitle": "나중"}))
            .await
            .unwrap();
        let stale = cache.get_value(keys::SEO, Value::Null).await;
        assert_eq!(stale["ogTitle"], "처음");

        // Once the TTL elapses the new value must be observed.
        cache.expire(keys::SEO).await;
        let fresh = cache.get_value(keys::SEO, Value::Null).await;
        assert_eq!(fresh["ogTitle"], "나중");
    }

    #[tokio::test]
    async fn test_typed_get_falls_back_on_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path());
        cache
            .save(keys::FEED, &serde_json::json!("not an object"))
            .await
            .unwrap();
        let settings: FeedSettings = cache.get(keys::FEED, FeedSettings::default()).await;
        assert!(settings.item_count.is_none());
    }

    /// Store stub whose every operation fails, for the failure-masking
    /// tests. A storage outage must never surface from a settings read.
    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn articles(&self) -> Result<Vec<crate::store::models::Article>, StoreError> {
            Err(broken())
        }
        async fn article_by_id(
            &self,
            _: &str,
        ) -> Result<Option<crate::store::models::Article>, StoreError> {
            Err(broken())
        }
        async fn create_article(
            &self,
            _: crate::store::models::Article,
        ) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn update_article(
            &self,
            _: &str,
            _: crate::store::models::ArticlePatch,
        ) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn delete_article(&self, _: &str) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn increment_views(&self, _: &str) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn add_view_log(&self, _: NewViewLog) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn view_logs(
            &self,
        ) -> Result<Vec<crate::store::models::ViewLogEntry>, StoreError> {
            Err(broken())
        }
        async fn distribute_logs(
            &self,
        ) -> Result<Vec<crate::store::models::DistributeLog>, StoreError> {
            Err(broken())
        }
        async fn add_distribute_logs(
            &self,
            _: Vec<crate::store::models::DistributeLog>,
        ) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn clear_distribute_logs(&self) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn get_setting(&self, _: &str) -> Result<Option<Value>, StoreError> {
            Err(broken())
        }
        async fn save_setting(&self, _: &str, _: &Value) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(broken())
        }
        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    fn broken() -> StoreError {
        StoreError::UpstreamStatus {
            status: 503,
            body: "down".to_string(),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_masked_with_fallback() {
        let cache = SettingsCache::new(Arc::new(BrokenStore));
        let value = cache
            .get_value("cp-rss-settings", serde_json::json!({"enabled": true}))
            .await;
        assert_eq!(value["enabled"], true);
    }

    #[tokio::test]
    async fn test_backend_failure_serves_stale_over_fallback() {
        // Prime through a working store, then swap in a broken one by
        // reusing the cache internals: simplest is to prime, expire, and
        // verify the stale value wins over the fallback on error.
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let cache = SettingsCache::new(store.clone());

        cache
            .save(keys::FEED, &serde_json::json!({"feedTitle": "살아있는 값"}))
            .await
            .unwrap();
        let primed = cache.get_value(keys::FEED, Value::Null).await;
        assert_eq!(primed["feedTitle"], "살아있는 값");

        // Expire the entry and break the backing file so the re-read fails.
        cache.expire(keys::FEED).await;
        std::fs::write(dir.path().join("settings.json"), b"{not json").unwrap();

        let served = cache
            .get_value(keys::FEED, serde_json::json!({"feedTitle": "fallback"}))
            .await;
        assert_eq!(served["feedTitle"], "살아있는 값");
    }
}
