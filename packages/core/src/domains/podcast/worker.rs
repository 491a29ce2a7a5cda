//! Podcast transcription worker.
//!
//! Stages: URL parse → iTunes lookup + show notes → audio download + ASR →
//! LLM reformat → PDF synthesis → archive. Retries re-execute the whole
//! handler (audio included); temp files are keyed by job id so attempts
//! never collide.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::itunes::{ItunesClient, PodcastLookup};
use super::pdf::{format_duration, synthesize, TranscriptPdf};
use super::reformat::{spelling_hints, Reformatter};
use super::shownotes::{brand_names, fetch_show_notes, ShowNotes};
use super::transcript::{clean_srt, is_srt};
use super::url::parse_podcast_url;
use crate::common::urls::slugify;
use crate::domains::archive::bin_path;
use crate::domains::ingest::MediaType;
use crate::kernel::asr::AsrClient;
use crate::kernel::events::{CoreEvent, EventBus};
use crate::kernel::jobs::{ActiveJob, JobHandler};

const AUDIO_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Payload of a podcast transcription job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastJobPayload {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked_at: Option<chrono::DateTime<Utc>>,
}

/// Return value of a successful transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastResult {
    pub pdf_path: String,
    pub audio_path: String,
    pub podcast: String,
    pub episode: String,
    pub transcript_chars: usize,
}

/// Handler for the podcast queue (concurrency 1).
pub struct PodcastHandler {
    itunes: ItunesClient,
    asr: AsrClient,
    reformatter: Reformatter,
    data_dir: PathBuf,
    bus: EventBus,
    http_client: reqwest::Client,
}

impl PodcastHandler {
    pub fn new(
        asr: AsrClient,
        reformatter: Reformatter,
        data_dir: PathBuf,
        bus: EventBus,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(AUDIO_DOWNLOAD_TIMEOUT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("failed to create audio HTTP client")?;
        Ok(Self {
            itunes: ItunesClient::new()?,
            asr,
            reformatter,
            data_dir,
            bus,
            http_client,
        })
    }

    fn stage(&self, job: &ActiveJob, url: &str, stage: &str) {
        self.bus.emit(CoreEvent::PodcastStage {
            job_id: job.id().to_string(),
            url: url.to_string(),
            stage: stage.to_string(),
        });
    }

    async fn transcribe(&self, job: &ActiveJob, payload: &PodcastJobPayload) -> Result<PodcastResult> {
        let url = &payload.url;

        // Stage 1: URL parse
        job.progress(10).await;
        self.stage(job, url, "parse");
        let parsed = parse_podcast_url(url)?;

        // Stage 2: metadata lookup + show notes
        self.stage(job, url, "lookup");
        let lookup = self
            .itunes
            .lookup_episode(parsed.podcast_id, parsed.episode_id)
            .await?;
        let notes = match &lookup.podcast.feed_url {
            Some(feed_url) => {
                fetch_show_notes(
                    feed_url,
                    &lookup.episode.track_name,
                    lookup.episode.episode_guid.as_deref(),
                )
                .await
            }
            None => ShowNotes::default(),
        };
        job.progress(20).await;

        // Stage 3: audio download + ASR
        self.stage(job, url, "transcribe");
        let audio_url = lookup
            .episode
            .episode_url
            .clone()
            .context("episode has no audio URL")?;
        let audio_ext = audio_extension(&audio_url);
        let temp_audio = std::env::temp_dir().join(format!("shelfmark-{}.{audio_ext}", job.id()));
        let audio_bytes = self.download_audio(&audio_url, &temp_audio).await?;

        let asr_result = self
            .asr
            .transcribe(audio_bytes, &format!("episode.{audio_ext}"))
            .await;
        let asr_result = match asr_result {
            Ok(result) => result,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_audio).await;
                return Err(e);
            }
        };
        job.progress(60).await;

        let raw_text = if is_srt(&asr_result.text) {
            clean_srt(&asr_result.text)
        } else {
            asr_result.text.clone()
        };

        // Stage 4: LLM reformatting
        self.stage(job, url, "reformat");
        let brands = brand_names(&notes);
        let hints = spelling_hints(&lookup.episode.track_name, &brands);
        let transcript = self.reformatter.reformat(&raw_text, &hints).await;
        job.progress(85).await;

        // Stage 5: PDF synthesis
        self.stage(job, url, "synthesize");
        let pdf_bytes = synthesize(&TranscriptPdf {
            podcast_name: lookup.podcast.collection_name.clone(),
            episode_title: lookup.episode.track_name.clone(),
            host: lookup.podcast.artist_name.clone(),
            genre: lookup.podcast.genre.clone(),
            duration: lookup.episode.track_time_millis.map(format_duration),
            date: lookup
                .episode
                .release_date
                .as_deref()
                .map(|d| d.split('T').next().unwrap_or(d).to_string()),
            source_url: url.clone(),
            show_notes: notes,
            transcript: transcript.clone(),
        })?;
        job.progress(90).await;

        // Stage 6: archive PDF + audio under a shared basename
        self.stage(job, url, "archive");
        let result = self
            .archive(payload, &parsed.slug, &lookup, &pdf_bytes, &temp_audio, audio_ext)
            .await;
        job.progress(100).await;
        result.map(|(pdf_path, audio_path)| PodcastResult {
            pdf_path,
            audio_path,
            podcast: lookup.podcast.collection_name.clone(),
            episode: lookup.episode.track_name.clone(),
            transcript_chars: transcript.chars().count(),
        })
    }

    async fn download_audio(&self, audio_url: &str, temp_path: &PathBuf) -> Result<Vec<u8>> {
        info!(url = %audio_url, "downloading episode audio");
        let response = self
            .http_client
            .get(audio_url)
            .send()
            .await
            .context("audio download failed")?;
        if !response.status().is_success() {
            anyhow::bail!("audio download returned HTTP {}", response.status());
        }
        // Buffered read is fine at typical episode sizes.
        let bytes = response
            .bytes()
            .await
            .context("failed to read audio body")?
            .to_vec();
        tokio::fs::write(temp_path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        Ok(bytes)
    }

    async fn archive(
        &self,
        payload: &PodcastJobPayload,
        podcast_slug: &str,
        lookup: &PodcastLookup,
        pdf_bytes: &[u8],
        temp_audio: &PathBuf,
        audio_ext: &str,
    ) -> Result<(String, String)> {
        let when = payload.bookmarked_at.unwrap_or_else(Utc::now);
        let dir = bin_path(&self.data_dir, when, MediaType::Podcast);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let episode_slug = slugify(&lookup.episode.track_name);
        let base = if episode_slug.is_empty() {
            format!("{podcast_slug}-{}", lookup.episode.track_id)
        } else {
            format!("{podcast_slug}-{episode_slug}")
        };

        let pdf_path = dir.join(format!("{base}.pdf"));
        tokio::fs::write(&pdf_path, pdf_bytes)
            .await
            .with_context(|| format!("failed to write {}", pdf_path.display()))?;

        let audio_path = dir.join(format!("{base}.{audio_ext}"));
        move_file(temp_audio, &audio_path).await?;

        info!(
            pdf = %pdf_path.display(),
            audio = %audio_path.display(),
            "podcast archived"
        );
        Ok((
            pdf_path.to_string_lossy().to_string(),
            audio_path.to_string_lossy().to_string(),
        ))
    }
}

/// Rename with a copy fallback for cross-device temp directories.
async fn move_file(from: &PathBuf, to: &PathBuf) -> Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to)
                .await
                .with_context(|| format!("failed to copy audio into {}", to.display()))?;
            let _ = tokio::fs::remove_file(from).await;
            Ok(())
        }
    }
}

fn audio_extension(audio_url: &str) -> &'static str {
    let path = Url::parse(audio_url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    if path.ends_with(".m4a") {
        "m4a"
    } else if path.ends_with(".aac") {
        "aac"
    } else if path.ends_with(".ogg") {
        "ogg"
    } else if path.ends_with(".wav") {
        "wav"
    } else {
        "mp3"
    }
}

#[async_trait]
impl JobHandler for PodcastHandler {
    async fn run(&self, job: &ActiveJob) -> Result<Value> {
        let payload: PodcastJobPayload = job.payload()?;
        let started = Instant::now();

        let result = self.transcribe(job, &payload).await?;

        self.bus.emit(CoreEvent::PodcastCompleted {
            job_id: job.id().to_string(),
            url: payload.url.clone(),
            pdf_path: result.pdf_path.clone(),
            audio_path: result.audio_path.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(serde_json::to_value(result)?)
    }

    async fn on_terminal_failure(&self, job: &ActiveJob, reason: &str) {
        let url = job
            .payload::<PodcastJobPayload>()
            .map(|p| p.url)
            .unwrap_or_default();
        // Attempts leave job-id-keyed temp audio behind; sweep it.
        let prefix = format!("shelfmark-{}", job.id());
        if let Ok(mut entries) = tokio::fs::read_dir(std::env::temp_dir()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                        warn!(path = %entry.path().display(), error = %e, "failed to sweep temp audio");
                    }
                }
            }
        }
        self.bus.emit(CoreEvent::PodcastFailed {
            job_id: job.id().to_string(),
            url,
            failure_reason: reason.to_string(),
        });
    }
}
