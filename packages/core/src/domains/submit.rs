//! Direct job submission and status, the surface external collaborators
//! call instead of touching queues directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::convert::ConversionJobPayload;
use super::ingest::router::{is_podcast_url, is_video_only_url};
use super::podcast::PodcastJobPayload;
use crate::kernel::jobs::{JobOptions, JobPriority, JobState, Queue};

/// A direct conversion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub priority: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_file_path: Option<String>,
}

/// Typed rejection reasons for submissions.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("video-only host not supported for conversion: {0}")]
    VideoOnlyHost(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// External view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
}

/// Submission + status surface over the pipeline queues.
#[derive(Clone)]
pub struct SubmitApi {
    convert_queue: Queue,
    podcast_queue: Queue,
    media_queue: Queue,
}

impl SubmitApi {
    pub fn new(convert_queue: Queue, podcast_queue: Queue, media_queue: Queue) -> Self {
        Self {
            convert_queue,
            podcast_queue,
            media_queue,
        }
    }

    /// Submit a URL for conversion. Podcast platform URLs are routed to the
    /// transcription queue; video-only hosts are rejected.
    pub async fn submit_conversion(&self, request: SubmitRequest) -> Result<String, SubmitError> {
        if url::Url::parse(&request.url).is_err() {
            return Err(SubmitError::InvalidUrl(request.url));
        }
        if is_video_only_url(&request.url) {
            return Err(SubmitError::VideoOnlyHost(request.url));
        }

        let options = JobOptions {
            job_id: None,
            delay: None,
            priority: if request.priority {
                JobPriority::High
            } else {
                JobPriority::Normal
            },
        };

        if is_podcast_url(&request.url) {
            let payload = PodcastJobPayload {
                url: request.url.clone(),
                title: request.title,
                bookmarked_at: request.bookmarked_at,
            };
            let id = self
                .podcast_queue
                .add(
                    "transcribe-podcast",
                    serde_json::to_value(&payload).map_err(anyhow::Error::from)?,
                    options,
                )
                .await?;
            info!(job_id = %id, url = %request.url, "podcast submitted");
            return Ok(id);
        }

        let payload = ConversionJobPayload {
            original_url: request.original_url.unwrap_or_else(|| request.url.clone()),
            url: request.url.clone(),
            title: request.title,
            bookmarked_at: request.bookmarked_at,
            old_file_path: request.old_file_path,
        };
        let id = self
            .convert_queue
            .add(
                "convert-url",
                serde_json::to_value(&payload).map_err(anyhow::Error::from)?,
                options,
            )
            .await?;
        info!(job_id = %id, url = %request.url, "conversion submitted");
        Ok(id)
    }

    /// Look a job up across the pipeline queues.
    pub async fn get_status(&self, job_id: &str) -> anyhow::Result<Option<JobStatus>> {
        for queue in [&self.convert_queue, &self.podcast_queue, &self.media_queue] {
            if let Some(record) = queue.get_job(job_id).await? {
                return Ok(Some(JobStatus {
                    state: record.state,
                    progress: record.progress,
                    result: record.return_value,
                    error: record.failed_reason,
                    attempts_made: record.attempts_made,
                    max_attempts: record.max_attempts,
                }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::QueueOptions;
    use crate::kernel::store::MemoryStore;
    use std::sync::Arc;

    fn api() -> SubmitApi {
        let store: Arc<dyn crate::kernel::store::Store> = Arc::new(MemoryStore::new());
        SubmitApi::new(
            Queue::new("convert", store.clone(), QueueOptions::default()),
            Queue::new("podcast", store.clone(), QueueOptions::default()),
            Queue::new("media", store, QueueOptions::default()),
        )
    }

    #[tokio::test]
    async fn video_only_hosts_are_rejected_with_typed_error() {
        let err = api()
            .submit_conversion(SubmitRequest {
                url: "https://www.youtube.com/watch?v=abc".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::VideoOnlyHost(_)));
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected() {
        let err = api()
            .submit_conversion(SubmitRequest {
                url: "not a url".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn podcast_urls_route_to_podcast_queue() {
        let api = api();
        let id = api
            .submit_conversion(SubmitRequest {
                url: "https://podcasts.apple.com/us/podcast/x/id1?i=10".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let status = api.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Queued);

        let record = api.podcast_queue.get_job(&id).await.unwrap().unwrap();
        assert_eq!(record.name, "transcribe-podcast");
    }

    #[tokio::test]
    async fn conversions_land_in_convert_queue_with_status() {
        let api = api();
        let id = api
            .submit_conversion(SubmitRequest {
                url: "https://example.com/a".into(),
                title: Some("T".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let status = api.get_status(&id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Queued);
        assert_eq!(status.attempts_made, 0);

        assert!(api.get_status("missing").await.unwrap().is_none());
    }
}
