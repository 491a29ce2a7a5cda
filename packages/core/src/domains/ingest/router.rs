//! Metadata enrichment and routing.
//!
//! Each queued bookmark item is optionally enriched from its web page and
//! then routed: enclosures to media collection, podcast platform URLs to
//! transcription, everything else to PDF conversion. Video-only hosts are
//! dropped unless they carried an enclosure.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::enrich::MetadataExtractor;
use super::item::{BookmarkItem, MediaType};
use crate::common::urls::is_asset_url;
use crate::domains::convert::ConversionJobPayload;
use crate::kernel::jobs::{ActiveJob, JobHandler, JobOptions, Queue};

/// Hosts recognized as the podcast platform.
const PODCAST_HOSTS: &[&str] = &["podcasts.apple.com"];

/// Hosts whose pages are video-only; conversion would capture a player
/// shell, so these are handled solely via media enclosures.
pub const VIDEO_ONLY_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];

pub fn is_podcast_url(url: &str) -> bool {
    host_of(url).map(|h| PODCAST_HOSTS.contains(&h.as_str())).unwrap_or(false)
}

pub fn is_video_only_url(url: &str) -> bool {
    host_of(url)
        .map(|h| {
            VIDEO_ONLY_HOSTS
                .iter()
                .any(|v| h == *v || h.ends_with(&format!(".{v}")))
        })
        .unwrap_or(false)
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// Deterministic media job id from the canonical URL.
pub fn media_job_id(canonical_url: &str) -> String {
    let sanitized: String = canonical_url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("media:{sanitized}")
}

/// Handler for the metadata queue.
pub struct RouteHandler {
    extractor: MetadataExtractor,
    convert_queue: Queue,
    media_queue: Queue,
    podcast_queue: Queue,
}

impl RouteHandler {
    pub fn new(convert_queue: Queue, media_queue: Queue, podcast_queue: Queue) -> Result<Self> {
        Ok(Self {
            extractor: MetadataExtractor::new()?,
            convert_queue,
            media_queue,
            podcast_queue,
        })
    }

    /// Enrich the item in place. Web-extracted fields take precedence over
    /// feed-provided ones.
    async fn enrich(&self, item: &mut BookmarkItem) {
        // Asset URLs are raw files, not pages; skip the fetch.
        if !is_asset_url(&item.original_url) {
            let meta = self.extractor.extract(&item.original_url).await;
            if meta.title.is_some() {
                item.title = meta.title;
            }
            if meta.author.is_some() {
                item.author = meta.author;
            }
            if meta.description.is_some() {
                item.description = meta.description;
            }
            if meta.image.is_some() {
                item.image = meta.image;
            }
            if meta.publisher.is_some() {
                item.publisher = meta.publisher;
            }
            if meta.published_at.is_some() {
                item.published_at = meta.published_at;
            }
        }

        if item.title.is_none() {
            item.title = Some("Untitled".to_string());
        }
        if item.bookmarked_at.is_none() {
            item.bookmarked_at = Some(Utc::now());
        }
    }

    async fn route(&self, item: BookmarkItem) -> Result<&'static str> {
        if let Some(enclosure) = &item.enclosure {
            debug!(url = %item.canonical_url, mime = %enclosure.mime_type, "routing to media collection");
            self.media_queue
                .add(
                    "collect-media",
                    serde_json::to_value(&item)?,
                    JobOptions::with_id(media_job_id(&item.canonical_url)),
                )
                .await?;

            // Pre-rendered PDFs are fully handled by media collection; other
            // enclosure kinds still route their page below.
            if item.media_type == Some(MediaType::Pdf) {
                return Ok("media");
            }
        }

        if is_podcast_url(&item.original_url) {
            debug!(url = %item.original_url, "routing to podcast transcription");
            self.podcast_queue
                .add(
                    "transcribe-podcast",
                    serde_json::json!({
                        "url": item.original_url,
                        "title": item.title,
                        "bookmarked_at": item.bookmarked_at,
                    }),
                    JobOptions::default(),
                )
                .await?;
            return Ok("podcast");
        }

        if is_video_only_url(&item.original_url) {
            info!(url = %item.original_url, "video-only URL without enclosure, skipping");
            return Ok("skipped");
        }

        let payload = ConversionJobPayload {
            url: item.original_url.clone(),
            original_url: item.original_url.clone(),
            title: item.title.clone(),
            bookmarked_at: item.bookmarked_at,
            old_file_path: None,
        };
        self.convert_queue
            .add("convert-url", serde_json::to_value(&payload)?, JobOptions::default())
            .await?;
        Ok("convert")
    }
}

#[async_trait]
impl JobHandler for RouteHandler {
    async fn run(&self, job: &ActiveJob) -> Result<Value> {
        let mut item: BookmarkItem = job.payload()?;
        self.enrich(&mut item).await;
        let routed_to = self.route(item).await?;
        Ok(serde_json::json!({ "routed_to": routed_to }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn podcast_urls_are_recognized_by_host() {
        assert!(is_podcast_url("https://podcasts.apple.com/us/podcast/x/id1?i=2"));
        assert!(!is_podcast_url("https://example.com/podcasts.apple.com"));
    }

    #[test]
    fn video_only_hosts_are_recognized() {
        assert!(is_video_only_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_video_only_url("https://youtu.be/abc"));
        assert!(is_video_only_url("https://vimeo.com/123"));
        assert!(!is_video_only_url("https://example.com/video"));
    }

    #[test]
    fn media_job_id_is_deterministic_and_sanitized() {
        let a = media_job_id("https://example.com/a?b=1");
        let b = media_job_id("https://example.com/a?b=1");
        assert_eq!(a, b);
        assert!(a.starts_with("media:"));
        assert!(!a.contains('/'));
        assert!(!a.contains('?'));
    }
}
