//! PDF content analysis: text density, error-page and paywall detection.
//!
//! The pattern tables are heuristic and deliberately public data surface;
//! additions are observable behavior changes and get covered by the tests
//! below.

use std::sync::OnceLock;

use lopdf::Document;
use regex::Regex;
use tracing::warn;

use crate::kernel::jobs::FailureKind;

/// Error-page phrasings, checked only on near-empty documents.
pub const ERROR_PAGE_PATTERNS: &[&str] = &[
    r"(?i)page (can'?t|cannot) be found",
    r"(?i)404 (error|not found)",
    r"(?i)\b404\b.{0,40}page",
    r"(?i)this page (doesn'?t|does not) exist",
    r"(?i)we couldn'?t find (that|the) page",
    r"(?i)the page you('re| are) looking for",
    r"(?i)access to this page has been denied",
];

/// Paywall phrasings and known-publisher strings.
pub const PAYWALL_PATTERNS: &[&str] = &[
    r"(?i)get unlimited access",
    r"(?i)subscribe to continue reading",
    r"(?i)subscribe now to read",
    r"(?i)continue reading with a subscription",
    r"(?i)this article is for subscribers",
    r"(?i)already a subscriber\?",
    r"(?i)\$\d+(\.\d{2})? (a|per|your first) month",
    r"(?i)create a free account to continue",
    r"(?i)you've reached your (free )?article limit",
];

const ERROR_PAGE_MAX_CHARS: usize = 2000;
const MIN_CHARS: usize = 500;
const LARGE_PDF_BYTES: usize = 500 * 1024;
const LARGE_PDF_MIN_CHARS: usize = 1000;
const DENSITY_MIN_CHARS_PER_KB: f64 = 5.0;
const DENSITY_MAX_CHARS: usize = 3000;
const DENSITY_MAX_CHARS_PER_PAGE: usize = 400;

fn error_page_regexes() -> &'static Vec<Regex> {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        ERROR_PAGE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("invalid error-page pattern"))
            .collect()
    })
}

fn paywall_regexes() -> &'static Vec<Regex> {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        PAYWALL_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("invalid paywall pattern"))
            .collect()
    })
}

/// Result of the content stage.
#[derive(Debug, Clone)]
pub struct ContentAnalysis {
    pub passed: bool,
    pub page_count: usize,
    pub char_count: usize,
    pub chars_per_kb: f64,
    pub reason: Option<String>,
    pub kind: Option<FailureKind>,
}

impl ContentAnalysis {
    fn pass(page_count: usize, char_count: usize, chars_per_kb: f64) -> Self {
        Self {
            passed: true,
            page_count,
            char_count,
            chars_per_kb,
            reason: None,
            kind: None,
        }
    }

    fn fail(
        kind: FailureKind,
        reason: String,
        page_count: usize,
        char_count: usize,
        chars_per_kb: f64,
    ) -> Self {
        Self {
            passed: false,
            page_count,
            char_count,
            chars_per_kb,
            reason: Some(reason),
            kind: Some(kind),
        }
    }
}

/// Analyze the rendered PDF's extractable text.
///
/// Parser failure passes the document: an unreadable-but-rendered PDF must
/// not block the pipeline.
pub fn analyze_pdf(pdf_bytes: &[u8]) -> ContentAnalysis {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "PDF parser failed, passing content check");
            return ContentAnalysis {
                passed: true,
                page_count: 0,
                char_count: 0,
                chars_per_kb: 0.0,
                reason: Some(format!("parser failure: {e}")),
                kind: None,
            };
        }
    };

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let page_count = pages.len();

    let mut text = String::new();
    for page in &pages {
        if let Ok(page_text) = doc.extract_text(&[*page]) {
            text.push_str(&page_text);
            text.push(' ');
        }
    }
    analyze_text(&text, page_count, pdf_bytes.len())
}

/// Core checks over already-extracted text (separable for testing).
pub fn analyze_text(raw_text: &str, page_count: usize, pdf_size: usize) -> ContentAnalysis {
    let text = collapse_whitespace(raw_text);
    let char_count = text.chars().count();
    let chars_per_kb = if pdf_size > 0 {
        char_count as f64 / (pdf_size as f64 / 1024.0)
    } else {
        0.0
    };

    if char_count < ERROR_PAGE_MAX_CHARS {
        if let Some(pattern) = first_match(error_page_regexes(), &text) {
            return ContentAnalysis::fail(
                FailureKind::ErrorPage,
                format!("matched error-page pattern \"{pattern}\""),
                page_count,
                char_count,
                chars_per_kb,
            );
        }
    }

    if let Some(pattern) = first_match(paywall_regexes(), &text) {
        return ContentAnalysis::fail(
            FailureKind::Paywall,
            format!("matched paywall pattern \"{pattern}\""),
            page_count,
            char_count,
            chars_per_kb,
        );
    }

    if char_count < MIN_CHARS {
        return ContentAnalysis::fail(
            FailureKind::Truncated,
            format!("only {char_count} chars of text"),
            page_count,
            char_count,
            chars_per_kb,
        );
    }

    if pdf_size > LARGE_PDF_BYTES && char_count < LARGE_PDF_MIN_CHARS {
        return ContentAnalysis::fail(
            FailureKind::Truncated,
            format!(
                "{char_count} chars in a {} KB document",
                pdf_size / 1024
            ),
            page_count,
            char_count,
            chars_per_kb,
        );
    }

    // Low-density bypass tuned so image-heavy legitimate pages and short
    // announcements still pass.
    let chars_per_page = if page_count > 0 {
        char_count / page_count
    } else {
        char_count
    };
    if page_count > 1
        && chars_per_kb < DENSITY_MIN_CHARS_PER_KB
        && char_count < DENSITY_MAX_CHARS
        && chars_per_page < DENSITY_MAX_CHARS_PER_PAGE
    {
        return ContentAnalysis::fail(
            FailureKind::Truncated,
            format!(
                "low text density: {chars_per_kb:.1} chars/KB over {page_count} pages"
            ),
            page_count,
            char_count,
            chars_per_kb,
        );
    }

    ContentAnalysis::pass(page_count, char_count, chars_per_kb)
}

fn first_match<'a>(regexes: &'a [Regex], text: &str) -> Option<&'a str> {
    regexes.iter().find(|r| r.is_match(text)).map(|r| r.as_str())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(chars: usize) -> String {
        "lorem ipsum dolor sit amet consectetur adipiscing elit "
            .chars()
            .cycle()
            .take(chars)
            .collect()
    }

    #[test]
    fn normal_article_passes() {
        let analysis = analyze_text(&filler(5000), 3, 80 * 1024);
        assert!(analysis.passed);
        assert!(analysis.kind.is_none());
    }

    #[test]
    fn char_count_boundary_at_500() {
        let fail = analyze_text(&filler(499), 1, 50 * 1024);
        assert!(!fail.passed);
        assert_eq!(fail.kind, Some(FailureKind::Truncated));

        let pass = analyze_text(&filler(500), 1, 50 * 1024);
        assert!(pass.passed, "500 chars on a single page must pass");
    }

    #[test]
    fn paywall_phrase_fails_regardless_of_context() {
        let text = format!("{} Subscribe to continue reading {}", filler(3000), filler(3000));
        let analysis = analyze_text(&text, 2, 100 * 1024);
        assert!(!analysis.passed);
        assert_eq!(analysis.kind, Some(FailureKind::Paywall));
    }

    #[test]
    fn price_bearing_paywall_phrase_matches() {
        let text = format!("{} only $4.99 per month {}", filler(1000), filler(1000));
        let analysis = analyze_text(&text, 1, 50 * 1024);
        assert_eq!(analysis.kind, Some(FailureKind::Paywall));
    }

    #[test]
    fn error_page_detected_only_when_short() {
        let short = format!("Sorry, this page doesn't exist. {}", filler(200));
        let analysis = analyze_text(&short, 1, 10 * 1024);
        assert_eq!(analysis.kind, Some(FailureKind::ErrorPage));

        // The same phrase buried in a long article is content, not an error.
        let long = format!("{} this page doesn't exist {}", filler(2000), filler(2000));
        let analysis = analyze_text(&long, 2, 100 * 1024);
        assert!(analysis.passed);
    }

    #[test]
    fn large_pdf_with_little_text_is_truncated() {
        let analysis = analyze_text(&filler(800), 1, 600 * 1024);
        assert!(!analysis.passed);
        assert_eq!(analysis.kind, Some(FailureKind::Truncated));
    }

    #[test]
    fn low_density_multi_page_fails() {
        // 2 pages, ~600 chars, 200 KB -> ~3 chars/KB, 300 chars/page
        let analysis = analyze_text(&filler(600), 2, 200 * 1024);
        assert!(!analysis.passed);
        assert_eq!(analysis.kind, Some(FailureKind::Truncated));
    }

    #[test]
    fn image_heavy_single_page_passes_density_check() {
        // Single page escapes the density bypass by design.
        let analysis = analyze_text(&filler(600), 1, 200 * 1024);
        assert!(analysis.passed);
    }

    #[test]
    fn unparseable_pdf_passes_with_reason() {
        let analysis = analyze_pdf(b"not a pdf at all");
        assert!(analysis.passed);
        assert!(analysis.reason.unwrap().starts_with("parser failure"));
    }

    #[test]
    fn whitespace_is_collapsed_before_counting() {
        let text = "a\n\n\n   b\t\tc".to_string();
        let analysis = analyze_text(&text, 1, 1024);
        assert_eq!(analysis.char_count, 5); // "a b c"
    }
}
