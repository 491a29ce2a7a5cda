//! Failure classification for terminal job errors.
//!
//! The queue stores only a string reason, so every failure travels as
//! `"{kind}: {message}"`. [`FailureKind`] is the typed view at the
//! boundary; [`classify`]/[`FailureKind::message`] are the single
//! parse/format pair for that wire format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed taxonomy of failure modes surfaced to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NavigationError,
    BotDetected,
    BlankPage,
    Paywall,
    Truncated,
    LowContrast,
    MissingContent,
    QualityFailed,
    ErrorPage,
    LoginRequired,
    DownloadFailed,
    NotPdf,
    FileMissing,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::NavigationError => "navigation_error",
            FailureKind::BotDetected => "bot_detected",
            FailureKind::BlankPage => "blank_page",
            FailureKind::Paywall => "paywall",
            FailureKind::Truncated => "truncated",
            FailureKind::LowContrast => "low_contrast",
            FailureKind::MissingContent => "missing_content",
            FailureKind::QualityFailed => "quality_failed",
            FailureKind::ErrorPage => "error_page",
            FailureKind::LoginRequired => "login_required",
            FailureKind::DownloadFailed => "download_failed",
            FailureKind::NotPdf => "not_pdf",
            FailureKind::FileMissing => "file_missing",
            FailureKind::Unknown => "unknown",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "timeout" => FailureKind::Timeout,
            "navigation_error" => FailureKind::NavigationError,
            "bot_detected" => FailureKind::BotDetected,
            "blank_page" => FailureKind::BlankPage,
            "paywall" => FailureKind::Paywall,
            "truncated" => FailureKind::Truncated,
            "low_contrast" => FailureKind::LowContrast,
            "missing_content" => FailureKind::MissingContent,
            "quality_failed" => FailureKind::QualityFailed,
            "error_page" => FailureKind::ErrorPage,
            "login_required" => FailureKind::LoginRequired,
            "download_failed" => FailureKind::DownloadFailed,
            "not_pdf" => FailureKind::NotPdf,
            "file_missing" => FailureKind::FileMissing,
            "unknown" => FailureKind::Unknown,
            _ => return None,
        })
    }

    /// Build the wire-format reason string: `"{kind}: {message}"`.
    pub fn message(&self, detail: impl fmt::Display) -> String {
        format!("{}: {}", self.as_str(), detail)
    }

    /// Build an `anyhow::Error` carrying the wire-format reason.
    pub fn error(&self, detail: impl fmt::Display) -> anyhow::Error {
        anyhow::anyhow!(self.message(detail))
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a stored failure reason back into its kind and detail message.
///
/// Reasons without a recognized prefix come back as [`FailureKind::Unknown`]
/// with the whole string as the detail.
pub fn classify(reason: &str) -> (FailureKind, &str) {
    if let Some((prefix, rest)) = reason.split_once(':') {
        if let Some(kind) = FailureKind::parse(prefix.trim()) {
            return (kind, rest.trim_start());
        }
    }
    (FailureKind::Unknown, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_and_classify_roundtrip() {
        for kind in [
            FailureKind::Timeout,
            FailureKind::NavigationError,
            FailureKind::BotDetected,
            FailureKind::BlankPage,
            FailureKind::Paywall,
            FailureKind::Truncated,
            FailureKind::QualityFailed,
            FailureKind::FileMissing,
        ] {
            let wire = kind.message("something went wrong");
            let (parsed, detail) = classify(&wire);
            assert_eq!(parsed, kind);
            assert_eq!(detail, "something went wrong");
        }
    }

    #[test]
    fn unprefixed_reason_is_unknown() {
        let (kind, detail) = classify("ECONNRESET while reading body");
        assert_eq!(kind, FailureKind::Unknown);
        assert_eq!(detail, "ECONNRESET while reading body");
    }

    #[test]
    fn unrecognized_prefix_is_unknown() {
        let (kind, _) = classify("weird_thing: happened");
        assert_eq!(kind, FailureKind::Unknown);
    }

    #[test]
    fn detail_containing_colons_survives() {
        let wire = FailureKind::NavigationError.message("net::ERR_NAME_NOT_RESOLVED at https://x");
        let (kind, detail) = classify(&wire);
        assert_eq!(kind, FailureKind::NavigationError);
        assert_eq!(detail, "net::ERR_NAME_NOT_RESOLVED at https://x");
    }
}
