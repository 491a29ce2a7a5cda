//! Rerun support: resubmit archived PDFs for fresh conversion.
//!
//! The source URL is recovered from each PDF's `Subject` metadata, so
//! reruns work long after the queue records were pruned. The old file path
//! rides along and is deleted only after the new save lands elsewhere.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::browse::Library;
use super::pdf_store::extract_subject;
use crate::domains::convert::ConversionJobPayload;
use crate::kernel::jobs::{JobOptions, Queue};

/// Result of a rerun submission.
#[derive(Debug, Clone, Serialize)]
pub struct RerunSummary {
    pub submitted: usize,
    pub jobs: Vec<String>,
}

/// Selection for [`RerunApi::rerun_selected`].
#[derive(Debug, Clone, Default)]
pub struct RerunSelection {
    /// Data-dir-relative paths of archived PDFs.
    pub files: Vec<String>,
    /// Source URLs to convert without an old file.
    pub urls: Vec<String>,
}

/// Rerun surface over the library and the conversion queue.
pub struct RerunApi {
    library: Library,
    convert_queue: Queue,
}

impl RerunApi {
    pub fn new(library: Library, convert_queue: Queue) -> Self {
        Self {
            library,
            convert_queue,
        }
    }

    /// Resubmit every PDF of a weekly bin.
    pub async fn rerun_week(&self, week_id: &str) -> Result<RerunSummary> {
        let files = self.library.list_files(week_id).await?;
        let mut summary = RerunSummary {
            submitted: 0,
            jobs: Vec::new(),
        };

        for file in files {
            if !file.name.ends_with(".pdf") || file.media_type != "pdfs" {
                continue;
            }
            let Some(url) = file.source_url.clone() else {
                warn!(file = %file.name, "no source URL in PDF metadata, skipping rerun");
                continue;
            };
            let abs_path = self.library_path(&file.path);
            let job_id = self.submit(url, Some(abs_path)).await?;
            summary.jobs.push(job_id);
            summary.submitted += 1;
        }

        info!(week = %week_id, submitted = summary.submitted, "week rerun submitted");
        Ok(summary)
    }

    /// Resubmit a selection of files and/or raw URLs.
    pub async fn rerun_selected(&self, selection: RerunSelection) -> Result<RerunSummary> {
        let mut summary = RerunSummary {
            submitted: 0,
            jobs: Vec::new(),
        };

        for rel_path in &selection.files {
            let abs_path = self.library_path(rel_path);
            let url = extract_subject(std::path::Path::new(&abs_path))
                .with_context(|| format!("unreadable PDF: {rel_path}"))?;
            let Some(url) = url else {
                warn!(file = %rel_path, "no source URL in PDF metadata, skipping rerun");
                continue;
            };
            let job_id = self.submit(url, Some(abs_path)).await?;
            summary.jobs.push(job_id);
            summary.submitted += 1;
        }

        for url in &selection.urls {
            let job_id = self.submit(url.clone(), None).await?;
            summary.jobs.push(job_id);
            summary.submitted += 1;
        }

        Ok(summary)
    }

    fn library_path(&self, rel: &str) -> String {
        self.library
            .data_dir()
            .join(rel)
            .to_string_lossy()
            .to_string()
    }

    async fn submit(&self, url: String, old_file_path: Option<String>) -> Result<String> {
        let payload = ConversionJobPayload {
            url: url.clone(),
            original_url: url,
            title: None,
            bookmarked_at: None,
            old_file_path,
        };
        self.convert_queue
            .add(
                "convert-url",
                serde_json::to_value(&payload)?,
                JobOptions::default(),
            )
            .await
    }
}
