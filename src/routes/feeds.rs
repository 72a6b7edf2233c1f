/**
 * Feed Routes
 * RSS 2.0, Atom 1.0, and JSON Feed 1.1 over the published articles
 */
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::settings::{keys, FeedSettings, SeoSettings};
use crate::state::AppState;
use crate::store::models::{Article, ArticleStatus};
use crate::store::Store;

const DEFAULT_ITEM_COUNT: usize = 50;
const DEFAULT_TITLE: &str = "뉴스데스크";
const DEFAULT_DESCRIPTION: &str = "뉴스를 전하는 사람들";
const DEFAULT_BASE_URL: &str = "https://news.example.co.kr";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static IMG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src="([^"]+)""#).expect("valid regex"));

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub category: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Parse the article's `YYYY-MM-DD` date as midnight UTC.
fn article_datetime(date: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

fn rfc822(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").to_string()
}

/// Explicit summary, or the first 200 characters of the tag-stripped body.
fn summary_of(article: &Article) -> String {
    match article.summary.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => s.to_string(),
        None => strip_tags(&article.body).chars().take(200).collect(),
    }
}

/// Thumbnail, or the first inline image in the body.
fn feed_image(article: &Article) -> Option<String> {
    article
        .thumbnail
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            IMG_RE
                .captures(&article.body)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
}

struct FeedContext {
    articles: Vec<Article>,
    base_url: String,
    title: String,
    description: String,
    feed: FeedSettings,
}

async fn load_context(
    state: &AppState,
    category: Option<&str>,
) -> Result<FeedContext, Response> {
    let articles = match state.store.articles().await {
        Ok(articles) => articles,
        Err(e) => {
            tracing::error!("feed generation failed to load articles: {}", e);
            return Err(plain_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable",
            ));
        }
    };

    let seo: SeoSettings = state.settings.get(keys::SEO, SeoSettings::default()).await;
    let feed: FeedSettings = state.settings.get(keys::FEED, FeedSettings::default()).await;

    let base_url = seo
        .canonical_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| u.trim_end_matches('/').to_string())
        .or_else(|| {
            std::env::var("SITE_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string())
        })
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let base_title = feed
        .feed_title
        .clone()
        .or(seo.og_title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let title = match category {
        Some(c) => format!("{} - {}", base_title, c),
        None => base_title,
    };
    let description = feed
        .feed_description
        .clone()
        .or(seo.og_description)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let item_count = feed.item_count.unwrap_or(DEFAULT_ITEM_COUNT);
    let mut published: Vec<Article> = articles
        .into_iter()
        .filter(|a| a.status == ArticleStatus::Published)
        .filter(|a| category.map(|c| a.category == c).unwrap_or(true))
        .collect();
    published.sort_by(|a, b| b.date.cmp(&a.date));
    published.truncate(item_count);

    Ok(FeedContext {
        articles: published,
        base_url,
        title,
        description,
        feed,
    })
}

fn plain_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

fn feed_response(content_type: &'static str, body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CACHE_CONTROL,
            "public, s-maxage=600, stale-while-revalidate=3600",
        )
        .body(Body::from(body))
        .unwrap()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/rss - RSS 2.0 feed, optionally filtered by category
pub async fn rss(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Response {
    let feed_settings: FeedSettings =
        state.settings.get(keys::FEED, FeedSettings::default()).await;

    // Disabled RSS answers an empty skeleton rather than 404, so feed
    // readers keep polling without erroring.
    if feed_settings.enabled == Some(false) {
        return feed_response(
            "application/rss+xml; charset=utf-8",
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <rss version=\"2.0\"><channel></channel></rss>"
                .to_string(),
        );
    }

    let category = query.category.as_deref().filter(|c| !c.is_empty());
    if category.is_some() && feed_settings.category_feeds == Some(false) {
        return plain_response(StatusCode::NOT_FOUND, "Not Found");
    }

    let ctx = match load_context(&state, category).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };
    let full_content = ctx.feed.full_content.unwrap_or(false);
    let language = ctx.feed.feed_language.as_deref().unwrap_or("ko");

    let mut items = String::new();
    for a in &ctx.articles {
        let url = format!("{}/article/{}", ctx.base_url, a.id);
        let summary = summary_of(a);
        let content = if full_content { a.body.clone() } else { summary };
        let category_tag = match &a.category {
            c if !c.is_empty() => format!("\n      <category>{}</category>", escape_xml(c)),
            _ => String::new(),
        };
        let author_tag = a
            .author
            .as_deref()
            .map(|v| format!("\n      <author>{}</author>", escape_xml(v)))
            .unwrap_or_default();
        let enclosure_tag = feed_image(a)
            .map(|img| {
                format!(
                    "\n      <enclosure url=\"{}\" type=\"image/jpeg\" length=\"0\" />",
                    escape_xml(&img)
                )
            })
            .unwrap_or_default();

        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      \
             <guid isPermaLink=\"true\">{}</guid>\n      <pubDate>{}</pubDate>\n      \
             <description>{}</description>{}{}{}\n    </item>\n",
            escape_xml(&a.title),
            escape_xml(&url),
            escape_xml(&url),
            rfc822(&article_datetime(&a.date)),
            escape_xml(&content),
            category_tag,
            author_tag,
            enclosure_tag,
        ));
    }

    let self_url = match category {
        Some(c) => format!("{}/api/rss?category={}", ctx.base_url, c),
        None => format!("{}/api/rss", ctx.base_url),
    };
    let channel_link = match category {
        Some(c) => format!("{}/category/{}", ctx.base_url, c),
        None => ctx.base_url.clone(),
    };
    let copyright_tag = ctx
        .feed
        .feed_copyright
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(|c| format!("\n    <copyright>{}</copyright>", escape_xml(c)))
        .unwrap_or_default();
    let image_tag = ctx
        .feed
        .feed_image_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| {
            format!(
                "\n    <image>\n      <url>{}</url>\n      <title>{}</title>\n      \
                 <link>{}</link>\n    </image>",
                escape_xml(u),
                escape_xml(&ctx.title),
                escape_xml(&ctx.base_url),
            )
        })
        .unwrap_or_default();

    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n  <channel>\n    \
         <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n    \
         <language>{}</language>\n    \
         <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\"/>\n    \
         <lastBuildDate>{}</lastBuildDate>{}{}\n{}  </channel>\n</rss>",
        escape_xml(&ctx.title),
        escape_xml(&channel_link),
        escape_xml(&ctx.description),
        escape_xml(language),
        escape_xml(&self_url),
        rfc822(&Utc::now()),
        copyright_tag,
        image_tag,
        items,
    );

    feed_response("application/rss+xml; charset=utf-8", xml)
}

/// GET /atom.xml - Atom 1.0 feed
pub async fn atom(State(state): State<Arc<AppState>>) -> Response {
    let feed_settings: FeedSettings =
        state.settings.get(keys::FEED, FeedSettings::default()).await;
    if feed_settings.enabled == Some(false) || feed_settings.atom_enabled == Some(false) {
        return plain_response(StatusCode::NOT_FOUND, "Not Found");
    }

    let ctx = match load_context(&state, None).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };
    let full_content = ctx.feed.full_content.unwrap_or(false);

    let updated = ctx
        .articles
        .first()
        .map(|a| article_datetime(&a.date))
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let mut entries = String::new();
    for a in &ctx.articles {
        let url = format!("{}/article/{}", ctx.base_url, a.id);
        let summary = summary_of(a);
        let content_tag = if full_content {
            format!(
                "\n    <content type=\"html\">{}</content>",
                escape_xml(&a.body)
            )
        } else {
            String::new()
        };
        let author_tag = a
            .author
            .as_deref()
            .map(|v| format!("\n    <author><name>{}</name></author>", escape_xml(v)))
            .unwrap_or_default();
        let category_tag = match &a.category {
            c if !c.is_empty() => format!("\n    <category term=\"{}\" />", escape_xml(c)),
            _ => String::new(),
        };
        let image_tag = feed_image(a)
            .map(|img| {
                format!(
                    "\n    <link rel=\"enclosure\" href=\"{}\" type=\"image/jpeg\" />",
                    escape_xml(&img)
                )
            })
            .unwrap_or_default();

        entries.push_str(&format!(
            "  <entry>\n    <title>{}</title>\n    <link href=\"{}\" />\n    <id>{}</id>\n    \
             <updated>{}</updated>\n    <summary type=\"text\">{}</summary>{}{}{}{}\n  </entry>\n",
            escape_xml(&a.title),
            escape_xml(&url),
            escape_xml(&url),
            article_datetime(&a.date).to_rfc3339(),
            escape_xml(&summary),
            content_tag,
            author_tag,
            category_tag,
            image_tag,
        ));
    }

    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <feed xmlns=\"http://www.w3.org/2005/Atom\">\n  <title>{}</title>\n  \
         <subtitle>{}</subtitle>\n  <link href=\"{}\" />\n  \
         <link rel=\"self\" href=\"{}/atom.xml\" type=\"application/atom+xml\" />\n  \
         <id>{}/</id>\n  <updated>{}</updated>\n{}</feed>",
        escape_xml(&ctx.title),
        escape_xml(&ctx.description),
        escape_xml(&ctx.base_url),
        escape_xml(&ctx.base_url),
        escape_xml(&ctx.base_url),
        updated,
        entries,
    );

    feed_response("application/atom+xml; charset=utf-8", xml)
}

/// GET /feed.json - JSON Feed 1.1
pub async fn json_feed(State(state): State<Arc<AppState>>) -> Response {
    let feed_settings: FeedSettings =
        state.settings.get(keys::FEED, FeedSettings::default()).await;
    if feed_settings.enabled == Some(false) || feed_settings.json_feed_enabled == Some(false) {
        return plain_response(StatusCode::NOT_FOUND, "Not Found");
    }

    let ctx = match load_context(&state, None).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };
    let full_content = ctx.feed.full_content.unwrap_or(false);

    let items: Vec<serde_json::Value> = ctx
        .articles
        .iter()
        .map(|a| {
            let url = format!("{}/article/{}", ctx.base_url, a.id);
            let mut item = serde_json::json!({
                "id": url,
                "url": url,
                "title": a.title,
                "summary": summary_of(a),
                "date_published": article_datetime(&a.date).to_rfc3339(),
            });
            if full_content {
                item["content_html"] = serde_json::json!(a.body);
            }
            if let Some(author) = &a.author {
                item["authors"] = serde_json::json!([{ "name": format!("{} 기자", author) }]);
            }
            if !a.category.is_empty() {
                item["tags"] = serde_json::json!([a.category]);
            }
            if let Some(img) = feed_image(a) {
                item["image"] = serde_json::json!(img);
            }
            item
        })
        .collect();

    let feed = serde_json::json!({
        "version": "https://jsonfeed.org/version/1.1",
        "title": ctx.title,
        "description": ctx.description,
        "home_page_url": ctx.base_url,
        "feed_url": format!("{}/feed.json", ctx.base_url),
        "items": items,
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/feed+json; charset=utf-8")
        .header(
            header::CACHE_CONTROL,
            "public, s-maxage=600, stale-while-revalidate=3600",
        )
        .body(Body::from(
            serde_json::to_string_pretty(&feed).unwrap_or_default(),
        ))
        .unwrap()
}
