//! Conversion worker: capture, verify, persist.
//!
//! Runs with concurrency 1; the browser and vision model are the scarce
//! resources. Quality failures save a debug artifact before raising so the
//! final PDF of a failed job is always inspectable.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::quality::QualityVerifier;
use super::{is_direct_pdf_url, ConversionJobPayload, ConversionResult};
use crate::domains::archive::{FailureLog, FailureRecord, PdfStore, SaveOptions};
use crate::kernel::browser::{Capturer, DESKTOP_USER_AGENT};
use crate::kernel::events::{CoreEvent, EventBus};
use crate::kernel::jobs::{ActiveJob, FailureKind, JobHandler};

/// Handler for the conversion queue.
pub struct ConvertHandler {
    capturer: Capturer,
    verifier: QualityVerifier,
    pdf_store: PdfStore,
    failure_log: FailureLog,
    bus: EventBus,
    debug_dir: PathBuf,
    http_client: reqwest::Client,
}

impl ConvertHandler {
    pub fn new(
        capturer: Capturer,
        verifier: QualityVerifier,
        pdf_store: PdfStore,
        failure_log: FailureLog,
        bus: EventBus,
        debug_dir: PathBuf,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(DESKTOP_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create download HTTP client")?;
        Ok(Self {
            capturer,
            verifier,
            pdf_store,
            failure_log,
            bus,
            debug_dir,
            http_client,
        })
    }

    async fn emit_progress(&self, job: &ActiveJob, url: &str, pct: u8) {
        job.progress(pct).await;
        self.bus.emit(CoreEvent::ConversionProgress {
            job_id: job.id().to_string(),
            url: url.to_string(),
            progress: pct,
        });
    }

    /// Keep the last rendered PDF of a failing job for post-mortems.
    async fn save_debug_artifact(&self, job_id: &str, pdf: &[u8]) {
        if pdf.is_empty() {
            return;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.debug_dir).await {
            warn!(error = %e, "failed to create debug directory");
            return;
        }
        let path = self.debug_dir.join(format!("{job_id}.pdf"));
        if let Err(e) = tokio::fs::write(&path, pdf).await {
            warn!(path = %path.display(), error = %e, "failed to save debug artifact");
        } else {
            debug!(path = %path.display(), "debug artifact saved");
        }
    }

    async fn finish_save(
        &self,
        payload: &ConversionJobPayload,
        pdf: &[u8],
        title: Option<String>,
        direct_article: bool,
    ) -> Result<PathBuf> {
        let opts = SaveOptions {
            title,
            bookmarked_at: payload.bookmarked_at,
            direct_article,
        };
        let path = self
            .pdf_store
            .save_pdf(pdf, &payload.original_url, &opts)
            .await?;

        if let Some(old) = &payload.old_file_path {
            self.pdf_store
                .delete_if_different(Path::new(old), &path)
                .await;
        }
        Ok(path)
    }

    /// Fast path for URLs whose response already is a PDF.
    async fn convert_direct_pdf(
        &self,
        job: &ActiveJob,
        payload: &ConversionJobPayload,
    ) -> Result<ConversionResult> {
        info!(url = %payload.url, "downloading direct PDF");
        let response = self
            .http_client
            .get(&payload.url)
            .send()
            .await
            .map_err(|e| FailureKind::DownloadFailed.error(e))?;

        if !response.status().is_success() {
            return Err(FailureKind::DownloadFailed.error(format!("HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let disposition_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition);

        let is_pdf = content_type.contains("application/pdf")
            || payload.url.to_ascii_lowercase().ends_with(".pdf");
        if !is_pdf {
            return Err(FailureKind::NotPdf.error(format!("content-type {content_type}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FailureKind::DownloadFailed.error(e))?;

        self.emit_progress(job, &payload.url, 50).await;

        let title = payload.title.clone().or(disposition_name);
        let path = self.finish_save(payload, &bytes, title, false).await?;
        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        Ok(ConversionResult {
            pdf_path: path.to_string_lossy().to_string(),
            pdf_size: size,
            completed_at: Utc::now(),
            url: payload.url.clone(),
            quality_score: None,
            quality_reasoning: None,
        })
    }

    async fn convert_rendered(
        &self,
        job: &ActiveJob,
        payload: &ConversionJobPayload,
    ) -> Result<ConversionResult> {
        let capture = self.capturer.capture(&payload.url).await?;
        self.emit_progress(job, &payload.url, 50).await;

        if let Err(e) = self.verifier.check_blank(&capture.screenshot, &capture.pdf) {
            self.save_debug_artifact(job.id(), &capture.pdf).await;
            return Err(e);
        }

        let visual = match self.verifier.check_visual(&capture.screenshot).await {
            Ok(visual) => visual,
            Err(e) => {
                self.save_debug_artifact(job.id(), &capture.pdf).await;
                return Err(e);
            }
        };

        if let Err(e) = self.verifier.check_content(&capture.pdf) {
            self.save_debug_artifact(job.id(), &capture.pdf).await;
            return Err(e);
        }
        self.emit_progress(job, &payload.url, 90).await;

        let title = payload.title.clone().or(capture.title.clone());
        let path = self
            .finish_save(payload, &capture.pdf, title, capture.direct_article)
            .await?;
        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        Ok(ConversionResult {
            pdf_path: path.to_string_lossy().to_string(),
            pdf_size: size,
            completed_at: Utc::now(),
            url: payload.url.clone(),
            quality_score: Some(visual.score),
            quality_reasoning: if visual.reasoning.is_empty() {
                None
            } else {
                Some(visual.reasoning.clone())
            },
        })
    }
}

#[async_trait]
impl JobHandler for ConvertHandler {
    async fn run(&self, job: &ActiveJob) -> Result<Value> {
        let payload: ConversionJobPayload = job.payload()?;
        let started = Instant::now();

        self.bus.emit(CoreEvent::ConversionStarted {
            job_id: job.id().to_string(),
            url: payload.url.clone(),
        });
        self.emit_progress(job, &payload.url, 10).await;

        let result = if is_direct_pdf_url(&payload.url) {
            self.convert_direct_pdf(job, &payload).await?
        } else {
            self.convert_rendered(job, &payload).await?
        };

        self.emit_progress(job, &payload.url, 100).await;
        info!(
            url = %payload.url,
            path = %result.pdf_path,
            bytes = result.pdf_size,
            "conversion complete"
        );
        self.bus.emit(CoreEvent::ConversionCompleted {
            job_id: job.id().to_string(),
            url: payload.url.clone(),
            pdf_path: result.pdf_path.clone(),
            pdf_size: result.pdf_size,
            quality_score: result.quality_score,
            quality_reasoning: result.quality_reasoning.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        Ok(serde_json::to_value(result)?)
    }

    async fn on_terminal_failure(&self, job: &ActiveJob, reason: &str) {
        let payload: Option<ConversionJobPayload> = job.payload().ok();
        let url = payload
            .as_ref()
            .map(|p| p.url.clone())
            .unwrap_or_default();

        self.bus.emit(CoreEvent::ConversionFailed {
            job_id: job.id().to_string(),
            url: url.clone(),
            failure_reason: reason.to_string(),
            attempts_made: job.record.attempts_made,
            max_attempts: job.record.max_attempts,
        });

        let record = FailureRecord {
            job_id: job.id().to_string(),
            url,
            original_url: payload.map(|p| p.original_url),
            failure_reason: reason.to_string(),
            failed_at: Utc::now(),
        };
        if let Err(e) = self.failure_log.record(&record).await {
            warn!(job_id = %job.id(), error = %e, "failed to record terminal failure");
        }
    }
}

/// Pull the filename out of a `Content-Disposition` header.
fn filename_from_disposition(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let part = part.trim();
        let value = part.strip_prefix("filename=")?;
        let name = value.trim_matches('"').trim();
        if name.is_empty() {
            None
        } else {
            // Drop the extension: the store appends .pdf itself.
            Some(name.trim_end_matches(".pdf").to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_filename_is_extracted() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="report-2024.pdf""#),
            Some("report-2024".to_string())
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=raw.pdf"),
            Some("raw".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }
}
