//! Visual quality scoring through a vision model.

use ollama_client::{ChatRequest, Message, OllamaClient};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::json::extract_object;
use crate::kernel::jobs::FailureKind;

/// Screenshot smaller than this suggests an unrendered page.
pub const BLANK_SCREENSHOT_BYTES: usize = 15_000;
/// PDF smaller than this carries no usable content.
pub const BLANK_PDF_BYTES: usize = 5_000;

/// Cheap pre-visual check. When the screenshot failed entirely (0 bytes)
/// only the PDF size decides.
pub fn is_blank_page(screenshot_bytes: usize, pdf_bytes: usize) -> bool {
    if screenshot_bytes == 0 {
        return pdf_bytes < BLANK_PDF_BYTES;
    }
    screenshot_bytes < BLANK_SCREENSHOT_BYTES && pdf_bytes < BLANK_PDF_BYTES
}

const SCORING_PROMPT: &str = "You are grading a screenshot of a web page that was captured for \
archival. The image shows only the top viewport (about 800px) of the page; do NOT flag the page \
as cut off or truncated merely because the screenshot ends. Score how well the page content \
rendered, 0-100: 100 means clean readable article content, 0 means nothing useful rendered. \
Respond with a single JSON object: {\"score\": <0-100>, \"issue\": one of \"blank_page\", \
\"paywall\", \"bot_detected\", \"login_required\", \"error_page\", or null, \"reasoning\": \
\"<one sentence>\"}. No other text.";

/// Parsed verdict of the vision model.
#[derive(Debug, Clone)]
pub struct VisualScore {
    /// 0..=100 after clamping; -1 marks a synthetic pass when the model was
    /// unreachable.
    pub score: i32,
    pub issue: Option<FailureKind>,
    pub reasoning: String,
}

impl VisualScore {
    /// Synthetic pass used when the verifier is unavailable; never blocks
    /// the pipeline.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            score: -1,
            issue: None,
            reasoning: format!("visual verifier unavailable: {reason}"),
        }
    }

    pub fn passes(&self, threshold: u32) -> bool {
        self.score < 0 || self.score as u32 >= threshold
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    score: serde_json::Value,
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Vision-model scorer.
#[derive(Debug, Clone)]
pub struct VisualScorer {
    client: OllamaClient,
    model: String,
}

impl VisualScorer {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Score a screenshot. Transport failures and unusable model output
    /// both degrade to a synthetic pass: verifier downtime must not fail
    /// conversions.
    pub async fn score_screenshot(&self, screenshot_png: &[u8]) -> VisualScore {
        let request = ChatRequest::new(&self.model)
            .message(Message::user_with_image(SCORING_PROMPT, screenshot_png))
            .temperature(0.0);

        let response = match self.client.chat(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "vision model unreachable");
                return VisualScore::unavailable(&e.to_string());
            }
        };

        let score = parse_verdict(&response);
        if score.score == 0 && score.issue == Some(FailureKind::Unknown) {
            // Unusable model output; a broken verifier must not fail pages.
            warn!(response = %response, "vision model output unparseable, passing");
            return VisualScore::unavailable("unparseable model output");
        }
        debug!(score = score.score, issue = ?score.issue, "visual score");
        score
    }
}

/// Parse the model reply: strict JSON, then first `{...}` block with a
/// `score` key, then a zero-score unknown fallback.
pub fn parse_verdict(response: &str) -> VisualScore {
    let Some(value) = extract_object(response, "score") else {
        return VisualScore {
            score: 0,
            issue: Some(FailureKind::Unknown),
            reasoning: "model response contained no parseable verdict".to_string(),
        };
    };

    let raw: RawVerdict = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(_) => {
            return VisualScore {
                score: 0,
                issue: Some(FailureKind::Unknown),
                reasoning: "model verdict had an unexpected shape".to_string(),
            }
        }
    };

    let score = raw
        .score
        .as_i64()
        .or_else(|| raw.score.as_str().and_then(|s| s.trim().parse().ok()))
        .unwrap_or(0)
        .clamp(0, 100) as i32;

    VisualScore {
        score,
        issue: raw.issue.as_deref().and_then(issue_to_kind),
        reasoning: raw.reasoning.unwrap_or_default(),
    }
}

fn issue_to_kind(issue: &str) -> Option<FailureKind> {
    match issue {
        "blank_page" => Some(FailureKind::BlankPage),
        "paywall" => Some(FailureKind::Paywall),
        "bot_detected" => Some(FailureKind::BotDetected),
        "login_required" => Some(FailureKind::LoginRequired),
        "error_page" => Some(FailureKind::ErrorPage),
        "null" | "none" | "" => None,
        _ => Some(FailureKind::QualityFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_page_boundaries() {
        // Below both thresholds: blank.
        assert!(is_blank_page(14_999, 4_999));
        // At the thresholds: proceeds.
        assert!(!is_blank_page(15_000, 5_000));
        // Healthy screenshot with a tiny PDF still proceeds to scoring.
        assert!(!is_blank_page(80_000, 4_000));
    }

    #[test]
    fn missing_screenshot_judges_pdf_alone() {
        assert!(is_blank_page(0, 4_999));
        assert!(!is_blank_page(0, 5_000));
    }

    #[test]
    fn strict_json_verdict() {
        let score = parse_verdict(r#"{"score": 85, "issue": null, "reasoning": "clean render"}"#);
        assert_eq!(score.score, 85);
        assert!(score.issue.is_none());
        assert!(score.passes(50));
    }

    #[test]
    fn verdict_embedded_in_prose() {
        let score = parse_verdict(
            "Looking at the screenshot, {\"score\": 20, \"issue\": \"paywall\", \"reasoning\": \"subscription overlay\"} is my call",
        );
        assert_eq!(score.score, 20);
        assert_eq!(score.issue, Some(FailureKind::Paywall));
        assert!(!score.passes(50));
    }

    #[test]
    fn garbage_falls_back_to_zero_unknown() {
        let score = parse_verdict("I cannot analyze this image.");
        assert_eq!(score.score, 0);
        assert_eq!(score.issue, Some(FailureKind::Unknown));
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(parse_verdict(r#"{"score": 150}"#).score, 100);
        assert_eq!(parse_verdict(r#"{"score": -20}"#).score, 0);
    }

    #[test]
    fn string_score_is_accepted() {
        assert_eq!(parse_verdict(r#"{"score": "70"}"#).score, 70);
    }

    #[test]
    fn synthetic_pass_never_blocks() {
        let score = VisualScore::unavailable("connection refused");
        assert_eq!(score.score, -1);
        assert!(score.passes(50));
        assert!(score.passes(100));
    }

    #[test]
    fn issue_mapping_covers_known_kinds() {
        assert_eq!(issue_to_kind("bot_detected"), Some(FailureKind::BotDetected));
        assert_eq!(issue_to_kind("login_required"), Some(FailureKind::LoginRequired));
        assert_eq!(issue_to_kind("null"), None);
        assert_eq!(issue_to_kind("something_else"), Some(FailureKind::QualityFailed));
    }
}
