//! Storage models - records persisted by the store backends (serde wire types).

use serde::{Deserialize, Serialize};

/// Article publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Published,
    Draft,
    Scheduled,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Published => "published",
            ArticleStatus::Draft => "draft",
            ArticleStatus::Scheduled => "scheduled",
        }
    }

    /// Parse a stored status string; anything unrecognized becomes a draft
    /// so a bad row never renders on the public site.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "published" => ArticleStatus::Published,
            "scheduled" => ArticleStatus::Scheduled,
            _ => ArticleStatus::Draft,
        }
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        ArticleStatus::Draft
    }
}

/// News article
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub category: String,
    /// ISO date, `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub status: ArticleStatus,
    #[serde(default)]
    pub views: u64,
    /// Article HTML; omitted (empty) in list responses
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    /// ISO datetime at which a scheduled article goes live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_publish_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Partial article update; only present fields are merged into the record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArticleStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_publish_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ArticlePatch {
    /// Merge the patch into an existing article. Absent fields keep their
    /// current value; there is no way to clear an optional field to null.
    pub fn apply(&self, article: &mut Article) {
        macro_rules! merge {
            ($field:ident) => {
                if let Some(v) = &self.$field {
                    article.$field = v.clone();
                }
            };
        }
        macro_rules! merge_opt {
            ($field:ident) => {
                if let Some(v) = &self.$field {
                    article.$field = Some(v.clone());
                }
            };
        }
        merge!(title);
        merge!(category);
        merge!(date);
        merge!(body);
        if let Some(status) = self.status {
            article.status = status;
        }
        if let Some(views) = self.views {
            article.views = views;
        }
        merge_opt!(thumbnail);
        merge_opt!(thumbnail_alt);
        merge_opt!(tags);
        merge_opt!(author);
        merge_opt!(author_email);
        merge_opt!(summary);
        merge_opt!(slug);
        merge_opt!(meta_description);
        merge_opt!(og_image);
        merge_opt!(scheduled_publish_at);
        merge_opt!(updated_at);
    }

    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().map(|o| o.is_empty()).unwrap_or(true))
            .unwrap_or(true)
    }
}

/// Append-only record of an article page view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewLogEntry {
    pub article_id: String,
    pub path: String,
    pub timestamp: String,
}

/// Distribution (portal syndication) outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributeStatus {
    Success,
    Failed,
    Pending,
}

/// Append-only record of one article-to-portal distribution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeLog {
    pub id: String,
    pub article_id: String,
    pub article_title: String,
    pub portal: String,
    pub status: DistributeStatus,
    pub timestamp: String,
    pub message: String,
}

/// Admin account stored under the `cp-admin-accounts` settings key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccount {
    pub id: String,
    pub username: String,
    /// Legacy plaintext password; upgraded to `password_hash` on first
    /// successful login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

/// Reader comment stored under the `cp-comments` settings key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub article_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_title: Option<String>,
    pub author: String,
    pub content: String,
    pub created_at: String,
    pub status: CommentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Approved,
    Pending,
}

/// Newsletter subscriber stored under the `cp-newsletter-subscribers` key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub subscribed_at: String,
    pub status: SubscriberStatus,
    /// Token for the public unsubscribe link; minted lazily for legacy rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ArticleStatus::Published).unwrap(),
            "\"published\""
        );
        assert_eq!(ArticleStatus::parse_lossy("scheduled"), ArticleStatus::Scheduled);
        assert_eq!(ArticleStatus::parse_lossy("whatever"), ArticleStatus::Draft);
    }

    #[test]
    fn test_article_roundtrip_uses_camel_case() {
        let a = Article {
            id: "a1".to_string(),
            title: "제목".to_string(),
            category: "뉴스".to_string(),
            date: "2024-05-01".to_string(),
            status: ArticleStatus::Published,
            views: 3,
            body: "<p>본문</p>".to_string(),
            thumbnail: None,
            thumbnail_alt: None,
            tags: None,
            author: Some("홍길동".to_string()),
            author_email: None,
            summary: None,
            slug: None,
            meta_description: None,
            og_image: None,
            scheduled_publish_at: None,
            updated_at: None,
        };
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("\"status\":\"published\""));
        assert!(!json.contains("author_email"));
        let back: Article = serde_json::from_str(&json).unwrap();
        assert_eq!(back.author.as_deref(), Some("홍길동"));
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let mut a = Article {
            id: "a1".to_string(),
            title: "old".to_string(),
            category: "뉴스".to_string(),
            date: "2024-05-01".to_string(),
            status: ArticleStatus::Draft,
            views: 10,
            body: "body".to_string(),
            thumbnail: Some("t.jpg".to_string()),
            thumbnail_alt: None,
            tags: None,
            author: None,
            author_email: None,
            summary: None,
            slug: None,
            meta_description: None,
            og_image: None,
            scheduled_publish_at: None,
            updated_at: None,
        };
        let patch: ArticlePatch =
            serde_json::from_str(r#"{"title":"new","status":"published"}"#).unwrap();
        patch.apply(&mut a);
        assert_eq!(a.title, "new");
        assert_eq!(a.status, ArticleStatus::Published);
        assert_eq!(a.views, 10);
        assert_eq!(a.thumbnail.as_deref(), Some("t.jpg"));
    }

    #[test]
    fn test_empty_patch_detected() {
        let patch: ArticlePatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
        let patch: ArticlePatch = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(!patch.is_empty());
    }
}
