//! Web page metadata extraction.
//!
//! Pulls `{title, author, date, description, image, publisher}` from Open
//! Graph tags, Twitter Card tags, JSON-LD, and plain HTML fallbacks.
//! Extraction failure is never fatal: items fall back to hostname metadata.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::kernel::browser::DESKTOP_USER_AGENT;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Metadata extracted from a web page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Fetches pages and extracts their metadata.
pub struct MetadataExtractor {
    client: reqwest::Client,
}

impl MetadataExtractor {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(DESKTOP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create metadata HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch `url` and extract metadata; falls back to hostname-only
    /// metadata when the page cannot be fetched or parsed.
    pub async fn extract(&self, url: &str) -> PageMetadata {
        match self.try_extract(url).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!(url = %url, error = %e, "metadata extraction failed, using fallback");
                fallback_metadata(url)
            }
        }
    }

    async fn try_extract(&self, url: &str) -> Result<PageMetadata> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP {} for {}", response.status(), url);
        }
        let html = response.text().await?;
        Ok(extract_from_html(&html))
    }
}

/// Hostname-only metadata for unreachable pages.
pub fn fallback_metadata(url: &str) -> PageMetadata {
    PageMetadata {
        title: Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string())),
        ..Default::default()
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

/// Extract metadata from raw HTML.
pub fn extract_from_html(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    let mut meta = PageMetadata::default();

    // Open Graph, then Twitter Card, then plain tags.
    meta.title = meta_content(&document, r#"meta[property="og:title"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="twitter:title"]"#))
        .or_else(|| {
            let selector = Selector::parse("title").ok()?;
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        });

    meta.description = meta_content(&document, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="description"]"#))
        .or_else(|| meta_content(&document, r#"meta[name="twitter:description"]"#));

    meta.image = meta_content(&document, r#"meta[property="og:image"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="twitter:image"]"#));

    meta.publisher = meta_content(&document, r#"meta[property="og:site_name"]"#);

    meta.author = meta_content(&document, r#"meta[name="author"]"#)
        .or_else(|| meta_content(&document, r#"meta[property="article:author"]"#));

    meta.published_at = meta_content(&document, r#"meta[property="article:published_time"]"#)
        .as_deref()
        .and_then(parse_date);

    // JSON-LD fills remaining gaps.
    if meta.title.is_none() || meta.author.is_none() || meta.published_at.is_none() {
        if let Some(ld) = extract_json_ld(&document) {
            if meta.title.is_none() {
                meta.title = ld
                    .get("headline")
                    .or_else(|| ld.get("name"))
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
            if meta.author.is_none() {
                meta.author = ld.get("author").and_then(|a| match a {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(o) => {
                        o.get("name").and_then(|n| n.as_str()).map(String::from)
                    }
                    serde_json::Value::Array(arr) => arr
                        .first()
                        .and_then(|a| a.get("name"))
                        .and_then(|n| n.as_str())
                        .map(String::from),
                    _ => None,
                });
            }
            if meta.published_at.is_none() {
                meta.published_at = ld
                    .get("datePublished")
                    .and_then(|v| v.as_str())
                    .and_then(parse_date);
            }
        }
    }

    meta
}

fn extract_json_ld(document: &Html) -> Option<serde_json::Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in document.select(&selector) {
        let text: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            // Either a single object or a @graph array.
            if value.is_object() {
                return Some(value);
            }
            if let Some(first) = value.as_array().and_then(|a| a.first()) {
                return Some(first.clone());
            }
        }
    }
    None
}
