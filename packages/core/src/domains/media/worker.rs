//! Media collection worker.
//!
//! Streams enclosure downloads to a temp path, then renames into the weekly
//! bin. Writes are idempotent: an existing non-empty destination reports
//! success without re-downloading, an empty one is removed and retried.
//! Transcript enclosures are generated asynchronously upstream, so a 404
//! surfaces as a retryable `file_missing`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::common::urls::{is_asset_url, sanitize_filename};
use crate::domains::archive::bin_path;
use crate::domains::ingest::{bearer_token_from_url, BookmarkItem, MediaType};
use crate::kernel::browser::DESKTOP_USER_AGENT;
use crate::kernel::events::{CoreEvent, EventBus};
use crate::kernel::jobs::{ActiveJob, FailureKind, JobHandler};

/// End-to-end download deadline.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Extension for a downloaded enclosure, from MIME type first, URL second.
pub fn extension_for(mime_type: &str, url: &str) -> &'static str {
    match mime_type {
        "video/mp4" => return "mp4",
        "video/webm" => return "webm",
        "application/pdf" => return "pdf",
        _ => {}
    }
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    if path.ends_with(".mp4") {
        "mp4"
    } else if path.ends_with(".webm") {
        "webm"
    } else if path.ends_with(".pdf") {
        "pdf"
    } else {
        "bin"
    }
}

/// Destination filename for an item: sanitized title (or hostname) plus the
/// inferred extension.
pub fn destination_filename(item: &BookmarkItem) -> String {
    let enclosure = item.enclosure.as_ref();
    let base = item
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            Url::parse(&item.original_url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        })
        .unwrap_or_else(|| "download".to_string());
    let ext = enclosure
        .map(|e| extension_for(&e.mime_type, &e.url))
        .unwrap_or("bin");
    format!("{}.{ext}", sanitize_filename(&base, 100))
}

/// Handler for the media queue (concurrency 2).
pub struct MediaHandler {
    data_dir: PathBuf,
    /// Reader feed URL; its `token` query parameter authorizes asset hosts.
    reader_api_url: Option<String>,
    bus: EventBus,
    http_client: reqwest::Client,
    shutdown: CancellationToken,
}

impl MediaHandler {
    pub fn new(
        data_dir: PathBuf,
        reader_api_url: Option<String>,
        bus: EventBus,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        // No total timeout on the client itself: the 5-minute deadline is
        // enforced around the whole streaming download below.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(DESKTOP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create media HTTP client")?;
        Ok(Self {
            data_dir,
            reader_api_url,
            bus,
            http_client,
            shutdown,
        })
    }

    async fn collect(&self, job: &ActiveJob, item: &BookmarkItem) -> Result<PathBuf> {
        let enclosure = item
            .enclosure
            .as_ref()
            .ok_or_else(|| FailureKind::MissingContent.error("item has no enclosure"))?;
        let media_type = item.media_type.unwrap_or(MediaType::Video);

        let when = item.bookmarked_at.unwrap_or_else(Utc::now);
        let dir = bin_path(&self.data_dir, when, media_type);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let dest = dir.join(destination_filename(item));

        // Idempotency: a finished file wins, a zero-byte one is retried.
        if let Ok(meta) = tokio::fs::metadata(&dest).await {
            if meta.len() > 0 {
                info!(path = %dest.display(), "media already collected");
                return Ok(dest);
            }
            let _ = tokio::fs::remove_file(&dest).await;
        }

        let tmp = dest.with_extension(format!("{}.part", job.id()));
        let download = self.download_to(&enclosure.url, &tmp, media_type);

        let outcome = tokio::select! {
            result = tokio::time::timeout(DOWNLOAD_TIMEOUT, download) => match result {
                Ok(result) => result,
                Err(_) => Err(FailureKind::Timeout.error("download exceeded 5 minutes")),
            },
            _ = self.shutdown.cancelled() => {
                Err(FailureKind::Timeout.error("download cancelled by shutdown"))
            }
        };

        if let Err(e) = outcome {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp, &dest)
            .await
            .with_context(|| format!("failed to move download into {}", dest.display()))?;
        Ok(dest)
    }

    async fn download_to(&self, url: &str, tmp: &Path, media_type: MediaType) -> Result<()> {
        let mut request = self.http_client.get(url);
        if is_asset_url(url) {
            if let Some(token) = self
                .reader_api_url
                .as_deref()
                .and_then(bearer_token_from_url)
            {
                request = request.bearer_auth(token);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| FailureKind::DownloadFailed.error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND && media_type == MediaType::Transcript {
            // Transcript generation upstream is asynchronous; retry later.
            return Err(FailureKind::FileMissing.error("transcript not yet available"));
        }
        if !status.is_success() {
            return Err(FailureKind::DownloadFailed.error(format!("HTTP {status}")));
        }

        let expected_len = response.content_length();
        let mut file = tokio::fs::File::create(tmp)
            .await
            .with_context(|| format!("failed to create {}", tmp.display()))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FailureKind::DownloadFailed.error(e))?;
            file.write_all(&chunk)
                .await
                .context("failed to write download chunk")?;
            written += chunk.len() as u64;
        }
        file.flush().await.context("failed to flush download")?;

        if let Some(expected) = expected_len {
            if expected != written {
                // Some servers lie about Content-Length; keep the bytes.
                warn!(expected, written, url = %url, "content-length mismatch");
            }
        }
        debug!(bytes = written, url = %url, "download complete");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for MediaHandler {
    async fn run(&self, job: &ActiveJob) -> Result<Value> {
        let item: BookmarkItem = job.payload()?;
        let url = item
            .enclosure
            .as_ref()
            .map(|e| e.url.clone())
            .unwrap_or_else(|| item.original_url.clone());

        let path = self.collect(job, &item).await?;
        let bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        self.bus.emit(CoreEvent::MediaSaved {
            job_id: job.id().to_string(),
            url,
            path: path.to_string_lossy().to_string(),
            media_type: item
                .media_type
                .unwrap_or(MediaType::Video)
                .as_str()
                .to_string(),
            bytes,
        });

        Ok(serde_json::json!({
            "path": path.to_string_lossy(),
            "bytes": bytes,
        }))
    }

    async fn on_terminal_failure(&self, job: &ActiveJob, reason: &str) {
        let url = job
            .payload::<BookmarkItem>()
            .map(|i| i.original_url)
            .unwrap_or_default();
        self.bus.emit(CoreEvent::MediaFailed {
            job_id: job.id().to_string(),
            url,
            failure_reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::ingest::{Enclosure, FeedSource};

    fn item_with(mime: &str, url: &str, title: Option<&str>) -> BookmarkItem {
        let mut item = BookmarkItem::new(
            "https://example.com/page",
            "https://example.com/page",
            "g",
            FeedSource::Reader,
        );
        item.title = title.map(String::from);
        item.enclosure = Some(Enclosure {
            url: url.to_string(),
            mime_type: mime.to_string(),
            length: None,
        });
        item
    }

    #[test]
    fn extension_prefers_mime_type() {
        assert_eq!(extension_for("video/mp4", "https://x.com/clip"), "mp4");
        assert_eq!(extension_for("video/webm", "https://x.com/clip.mp4"), "webm");
        assert_eq!(extension_for("application/pdf", "https://x.com/doc"), "pdf");
    }

    #[test]
    fn extension_falls_back_to_url() {
        assert_eq!(extension_for("application/octet-stream", "https://x.com/clip.mp4"), "mp4");
        assert_eq!(extension_for("", "https://x.com/doc.pdf?x=1"), "pdf");
        assert_eq!(extension_for("", "https://x.com/mystery"), "bin");
    }

    #[test]
    fn filename_uses_title_then_hostname() {
        let titled = item_with("video/mp4", "https://cdn.example.com/v.mp4", Some("A Great Talk"));
        assert_eq!(destination_filename(&titled), "A Great Talk.mp4");

        let untitled = item_with("video/mp4", "https://cdn.example.com/v.mp4", None);
        assert_eq!(destination_filename(&untitled), "example.com.mp4");
    }

    #[test]
    fn filename_is_sanitized() {
        let nasty = item_with("application/pdf", "https://x.com/d.pdf", Some("a/b:c*d?"));
        assert_eq!(destination_filename(&nasty), "a-b-c-d.pdf");
    }
}
