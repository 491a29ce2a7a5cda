//! Feed fetching and source-specific parsing.
//!
//! Two sources are defined: an RSS feed with occasional PDF enclosures
//! (pocketfeed) and a paginated JSON bookmark API with Bearer auth
//! (reader). Both are polled with conditional headers so an unchanged feed
//! costs one 304.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::dedup::DedupIndex;
use super::item::{BookmarkItem, Enclosure, FeedSource, MediaType};
use crate::common::urls::canonicalize;
use crate::kernel::browser::DESKTOP_USER_AGENT;
use crate::kernel::store::Store;

const READER_PAGE_SIZE: usize = 50;
const READER_MAX_PAGES: usize = 20;

/// Conditional-polling cache per source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedCache {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl FeedCache {
    fn key(source: FeedSource) -> String {
        format!("feed:cache:{source}")
    }

    pub async fn load(store: &Arc<dyn Store>, source: FeedSource) -> Result<Self> {
        Ok(match store.get(&Self::key(source)).await? {
            Some(json) => serde_json::from_str(&json).unwrap_or_default(),
            None => Self::default(),
        })
    }

    pub async fn save(&self, store: &Arc<dyn Store>, source: FeedSource) -> Result<()> {
        store
            .set(&Self::key(source), &serde_json::to_string(self)?)
            .await
    }
}

/// Outcome of one conditional poll.
#[derive(Debug)]
pub enum PollFetch {
    /// HTTP 304: nothing changed, keep the cache.
    NotModified,
    /// Fresh content with the cache headers to persist.
    Items(Vec<BookmarkItem>, FeedCache),
}

/// HTTP fetcher for both feed sources.
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(DESKTOP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create feed HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch and parse one source.
    pub async fn fetch(
        &self,
        source: FeedSource,
        feed_url: &str,
        cache: &FeedCache,
        dedup: &DedupIndex,
    ) -> Result<PollFetch> {
        match source {
            FeedSource::Pocketfeed => self.fetch_pocketfeed(feed_url, cache).await,
            FeedSource::Reader => self.fetch_reader(feed_url, cache, dedup).await,
        }
    }

    fn conditional_get(&self, url: &str, cache: &FeedCache) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(etag) = &cache.etag {
            req = req.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(lm) = &cache.last_modified {
            req = req.header(reqwest::header::IF_MODIFIED_SINCE, lm);
        }
        req
    }

    fn cache_from_response(response: &reqwest::Response) -> FeedCache {
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        FeedCache {
            etag: header(reqwest::header::ETAG),
            last_modified: header(reqwest::header::LAST_MODIFIED),
        }
    }

    async fn fetch_pocketfeed(&self, feed_url: &str, cache: &FeedCache) -> Result<PollFetch> {
        let response = self
            .conditional_get(feed_url, cache)
            .send()
            .await
            .context("pocketfeed request failed")?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(PollFetch::NotModified);
        }
        if !response.status().is_success() {
            anyhow::bail!("pocketfeed returned HTTP {}", response.status());
        }

        let new_cache = Self::cache_from_response(&response);
        let bytes = response.bytes().await.context("failed to read feed body")?;
        let items = parse_pocketfeed(&bytes)?;
        Ok(PollFetch::Items(items, new_cache))
    }

    /// Paginated catchup: read pages of 50 until a page contains an
    /// already-seen GUID or no cursor remains, capped at 20 pages.
    async fn fetch_reader(
        &self,
        feed_url: &str,
        cache: &FeedCache,
        dedup: &DedupIndex,
    ) -> Result<PollFetch> {
        let token = bearer_token_from_url(feed_url);
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut new_cache = FeedCache::default();

        for page_index in 0..READER_MAX_PAGES {
            let page_url = reader_page_url(feed_url, READER_PAGE_SIZE, cursor.as_deref())?;

            let mut req = if page_index == 0 {
                self.conditional_get(&page_url, cache)
            } else {
                self.client.get(&page_url)
            };
            if let Some(token) = &token {
                req = req.bearer_auth(token);
            }

            let response = req.send().await.context("reader request failed")?;
            if page_index == 0 {
                if response.status() == reqwest::StatusCode::NOT_MODIFIED {
                    return Ok(PollFetch::NotModified);
                }
                new_cache = Self::cache_from_response(&response);
            }
            if !response.status().is_success() {
                anyhow::bail!("reader API returned HTTP {}", response.status());
            }

            let page: ReaderPage = response.json().await.context("invalid reader JSON")?;
            let mut caught_up = false;
            for raw in &page.items {
                if dedup.is_guid_seen(FeedSource::Reader, &raw.id).await? {
                    caught_up = true;
                    break;
                }
                if let Some(item) = reader_item_to_bookmark(raw) {
                    items.push(item);
                }
            }

            if caught_up || page.next_cursor.is_none() {
                break;
            }
            cursor = page.next_cursor;
        }

        debug!(count = items.len(), "reader catchup complete");
        Ok(PollFetch::Items(items, new_cache))
    }
}

fn reader_page_url(feed_url: &str, limit: usize, cursor: Option<&str>) -> Result<String> {
    let mut url = Url::parse(feed_url).context("invalid reader feed URL")?;
    url.query_pairs_mut().append_pair("limit", &limit.to_string());
    if let Some(cursor) = cursor {
        url.query_pairs_mut().append_pair("cursor", cursor);
    }
    Ok(url.to_string())
}

/// The Bearer token rides on the configured feed URL as `?token=`.
pub fn bearer_token_from_url(feed_url: &str) -> Option<String> {
    Url::parse(feed_url).ok().and_then(|u| {
        u.query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    })
}

// ---------------------------------------------------------------------------
// Source A: RSS with PDF enclosures
// ---------------------------------------------------------------------------

fn parse_pocketfeed(bytes: &[u8]) -> Result<Vec<BookmarkItem>> {
    let feed = feed_rs::parser::parse(bytes).context("failed to parse RSS feed")?;

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            continue;
        };
        let canonical = match canonicalize(&link) {
            Ok(c) => c,
            Err(e) => {
                warn!(url = %link, error = %e, "skipping item with unparseable URL");
                continue;
            }
        };

        let mut item = BookmarkItem::new(link, canonical, entry.id.clone(), FeedSource::Pocketfeed);
        item.title = entry.title.as_ref().map(|t| t.content.clone());
        item.creator = entry.authors.first().map(|a| a.name.clone());
        item.bookmarked_at = entry.published.or(entry.updated);

        if let Some(enclosure) = rss_enclosure(&entry) {
            if enclosure.mime_type == "application/pdf" {
                item.media_type = Some(MediaType::Transcript);
                item.enclosure = Some(enclosure);
            }
        }

        items.push(item);
    }
    Ok(items)
}

/// RSS enclosures surface either as `rel="enclosure"` links or media
/// content, depending on the producing feed.
fn rss_enclosure(entry: &feed_rs::model::Entry) -> Option<Enclosure> {
    if let Some(link) = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("enclosure"))
    {
        return Some(Enclosure {
            url: link.href.clone(),
            mime_type: link.media_type.clone().unwrap_or_default(),
            length: link.length,
        });
    }
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                return Some(Enclosure {
                    url: url.to_string(),
                    mime_type: content
                        .content_type
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_default(),
                    length: content.size,
                });
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Source B: paginated JSON bookmark API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReaderPage {
    #[serde(default)]
    items: Vec<ReaderItem>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReaderItem {
    id: String,
    #[serde(rename = "createdAt", default)]
    created_at: Option<DateTime<Utc>>,
    content: ReaderContent,
}

#[derive(Debug, Deserialize)]
struct ReaderContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(rename = "assetType", default)]
    asset_type: Option<String>,
    #[serde(rename = "assetUrl", default)]
    asset_url: Option<String>,
    #[serde(rename = "assetMimeType", default)]
    asset_mime_type: Option<String>,
}

fn reader_item_to_bookmark(raw: &ReaderItem) -> Option<BookmarkItem> {
    let content = &raw.content;

    let make = |original: String, canonical: String| {
        let mut item = BookmarkItem::new(original, canonical, raw.id.clone(), FeedSource::Reader);
        item.title = content.title.clone();
        item.creator = content.author.clone();
        item.bookmarked_at = raw.created_at;
        item
    };

    match content.kind.as_str() {
        "link" => {
            let url = content.url.clone()?;
            let canonical = canonicalize(&url).ok()?;
            Some(make(url, canonical))
        }
        "asset" => {
            let asset_url = content.asset_url.clone()?;
            match content.asset_type.as_deref() {
                Some("pdf") => {
                    // Pre-rendered PDF: the asset URL is its own identity.
                    let mut item = make(asset_url.clone(), asset_url.clone());
                    item.media_type = Some(MediaType::Pdf);
                    item.enclosure = Some(Enclosure {
                        url: asset_url,
                        mime_type: content
                            .asset_mime_type
                            .clone()
                            .unwrap_or_else(|| "application/pdf".to_string()),
                        length: None,
                    });
                    Some(item)
                }
                Some("video") => {
                    let page_url = content.url.clone().unwrap_or_else(|| asset_url.clone());
                    let canonical = canonicalize(&page_url).ok().unwrap_or(asset_url.clone());
                    let mut item = make(page_url, canonical);
                    item.media_type = Some(MediaType::Video);
                    item.enclosure = Some(Enclosure {
                        url: asset_url,
                        mime_type: content
                            .asset_mime_type
                            .clone()
                            .unwrap_or_else(|| "video/mp4".to_string()),
                        length: None,
                    });
                    Some(item)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Bookmarks</title>
    <item>
      <guid>item-1</guid>
      <title>An Article</title>
      <link>https://www.example.com/article?utm_source=feed</link>
      <pubDate>Mon, 05 Feb 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>item-2</guid>
      <title>Council Transcript</title>
      <link>https://city.example.org/meeting</link>
      <enclosure url="https://city.example.org/meeting.pdf" type="application/pdf" length="52100"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn pocketfeed_parses_items_and_canonicalizes() {
        let items = parse_pocketfeed(RSS_SAMPLE.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid, "item-1");
        assert_eq!(items[0].canonical_url, "https://example.com/article");
        assert_eq!(
            items[0].original_url,
            "https://www.example.com/article?utm_source=feed"
        );
        assert_eq!(items[0].title.as_deref(), Some("An Article"));
    }

    #[test]
    fn pdf_enclosure_becomes_transcript() {
        let items = parse_pocketfeed(RSS_SAMPLE.as_bytes()).unwrap();
        let transcript = &items[1];
        assert_eq!(transcript.media_type, Some(MediaType::Transcript));
        let enc = transcript.enclosure.as_ref().unwrap();
        assert_eq!(enc.url, "https://city.example.org/meeting.pdf");
        assert_eq!(enc.mime_type, "application/pdf");
    }

    #[test]
    fn token_is_extracted_from_feed_url() {
        assert_eq!(
            bearer_token_from_url("https://reader.example.com/api/feed?token=s3cret"),
            Some("s3cret".to_string())
        );
        assert_eq!(
            bearer_token_from_url("https://reader.example.com/api/feed"),
            None
        );
    }

    #[test]
    fn reader_page_url_appends_limit_and_cursor() {
        let url = reader_page_url("https://r.example.com/api/feed?token=t", 50, Some("abc")).unwrap();
        assert!(url.contains("limit=50"));
        assert!(url.contains("cursor=abc"));
        assert!(url.contains("token=t"));
    }

    #[test]
    fn reader_link_item_maps_to_bookmark() {
        let raw: ReaderItem = serde_json::from_str(
            r#"{"id": "r1", "createdAt": "2024-02-05T10:00:00Z",
                "content": {"type": "link", "url": "https://www.example.com/post?fbclid=x", "title": "Post"}}"#,
        )
        .unwrap();
        let item = reader_item_to_bookmark(&raw).unwrap();
        assert_eq!(item.canonical_url, "https://example.com/post");
        assert_eq!(item.source, FeedSource::Reader);
        assert!(item.media_type.is_none());
    }

    #[test]
    fn reader_pdf_asset_uses_asset_url_as_canonical() {
        let raw: ReaderItem = serde_json::from_str(
            r#"{"id": "r2",
                "content": {"type": "asset", "assetType": "pdf",
                            "assetUrl": "https://r.example.com/api/assets/doc9", "title": "Paper"}}"#,
        )
        .unwrap();
        let item = reader_item_to_bookmark(&raw).unwrap();
        assert_eq!(item.canonical_url, "https://r.example.com/api/assets/doc9");
        assert_eq!(item.media_type, Some(MediaType::Pdf));
        assert_eq!(
            item.enclosure.unwrap().mime_type,
            "application/pdf"
        );
    }

    #[test]
    fn reader_video_asset_maps_to_video() {
        let raw: ReaderItem = serde_json::from_str(
            r#"{"id": "r3",
                "content": {"type": "asset", "assetType": "video",
                            "url": "https://videos.example.com/v/1",
                            "assetUrl": "https://r.example.com/api/assets/v1"}}"#,
        )
        .unwrap();
        let item = reader_item_to_bookmark(&raw).unwrap();
        assert_eq!(item.media_type, Some(MediaType::Video));
        assert_eq!(item.enclosure.unwrap().url, "https://r.example.com/api/assets/v1");
    }

    #[test]
    fn unknown_reader_content_is_skipped() {
        let raw: ReaderItem = serde_json::from_str(
            r#"{"id": "r4", "content": {"type": "note"}}"#,
        )
        .unwrap();
        assert!(reader_item_to_bookmark(&raw).is_none());
    }
}
