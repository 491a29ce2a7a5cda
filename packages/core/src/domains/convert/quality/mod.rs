//! Multi-stage quality verification for captured pages.
//!
//! Gate order: blank-page heuristic (cheap) → visual scoring (vision
//! model) → content analysis (PDF text). The first failing gate produces a
//! kind-prefixed error for the retry machinery; verifier unavailability is
//! never a failure.

pub mod content;
pub mod visual;

pub use content::{analyze_pdf, analyze_text, ContentAnalysis, ERROR_PAGE_PATTERNS, PAYWALL_PATTERNS};
pub use visual::{is_blank_page, parse_verdict, VisualScore, VisualScorer};

use anyhow::Result;
use ollama_client::OllamaClient;
use tracing::info;

use crate::kernel::jobs::FailureKind;

/// Outcome of the full quality pipeline.
#[derive(Debug, Clone)]
pub struct QualityVerdict {
    /// -1 when the vision model was unavailable (synthetic pass).
    pub score: i32,
    pub reasoning: Option<String>,
}

/// Composed verifier used by the conversion worker.
pub struct QualityVerifier {
    scorer: VisualScorer,
    threshold: u32,
}

impl QualityVerifier {
    pub fn new(client: OllamaClient, vision_model: impl Into<String>, threshold: u32) -> Self {
        Self {
            scorer: VisualScorer::new(client, vision_model),
            threshold,
        }
    }

    /// Stage 1: blank-page heuristic. Errors with `blank_page`.
    pub fn check_blank(&self, screenshot: &[u8], pdf: &[u8]) -> Result<()> {
        if is_blank_page(screenshot.len(), pdf.len()) {
            return Err(FailureKind::BlankPage.error(format!(
                "screenshot {} B, pdf {} B",
                screenshot.len(),
                pdf.len()
            )));
        }
        Ok(())
    }

    /// Stage 2: visual scoring. Errors with the model-reported issue kind,
    /// or `quality_failed` below threshold.
    pub async fn check_visual(&self, screenshot: &[u8]) -> Result<VisualScore> {
        if screenshot.is_empty() {
            // Screenshot capture failed earlier; skip straight to content.
            return Ok(VisualScore::unavailable("no screenshot captured"));
        }
        let score = self.scorer.score_screenshot(screenshot).await;
        if score.passes(self.threshold) {
            info!(score = score.score, "visual check passed");
            return Ok(score);
        }
        let kind = score.issue.unwrap_or(FailureKind::QualityFailed);
        Err(kind.error(format!(
            "visual score {} below threshold {} ({})",
            score.score, self.threshold, score.reasoning
        )))
    }

    /// Stage 3: content analysis. Errors with the analyzer's kind.
    pub fn check_content(&self, pdf: &[u8]) -> Result<ContentAnalysis> {
        let analysis = analyze_pdf(pdf);
        if analysis.passed {
            return Ok(analysis);
        }
        let kind = analysis.kind.unwrap_or(FailureKind::Truncated);
        let reason = analysis.reason.clone().unwrap_or_default();
        Err(kind.error(reason))
    }
}
