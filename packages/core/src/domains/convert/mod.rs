//! URL-to-PDF conversion pipeline.

pub mod quality;
mod worker;

pub use worker::ConvertHandler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Payload of a conversion job.
///
/// `url` is the navigation target (kept verbatim, some sites need `www.`);
/// `original_url` feeds external-link generation and PDF metadata.
/// `old_file_path` is set on reruns and deleted only after a successful
/// save to a different path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJobPayload {
    pub url: String,
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_file_path: Option<String>,
}

/// Return value of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub pdf_path: String,
    pub pdf_size: u64,
    pub completed_at: DateTime<Utc>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_reasoning: Option<String>,
}

/// Host/path patterns whose responses are PDF payloads even without a
/// `.pdf` extension.
const DIRECT_PDF_PATTERNS: &[(&str, &str)] = &[
    ("arxiv.org", "/pdf/"),
    ("dl.acm.org", "/doi/pdf"),
    ("openreview.net", "/pdf"),
];

/// Whether a URL should bypass rendering and be downloaded as a PDF.
pub fn is_direct_pdf_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();
    if path.ends_with(".pdf") {
        return true;
    }
    let Some(host) = parsed.host_str().map(|h| h.trim_start_matches("www.")) else {
        return false;
    };
    DIRECT_PDF_PATTERNS
        .iter()
        .any(|(h, p)| (host == *h || host.ends_with(&format!(".{h}"))) && path.starts_with(p))
}
