//! URL canonicalization and filename derivation.
//!
//! Canonical URLs are the identity used for global deduplication; the
//! original URL is always carried alongside because some sites require the
//! `www.` prefix and external snapshot links must use the URL as received.

use anyhow::{Context, Result};
use url::Url;

/// Query parameters that never change page identity.
const TRACKING_PARAMS: &[&str] = &["ref", "source", "fbclid", "gclid", "msclkid"];

/// Basename path segments that carry no information about the page.
const NON_DESCRIPTIVE_SEGMENTS: &[&str] =
    &["item", "comments", "post", "p", "a", "article", "story", "s"];

/// Canonicalize a URL for deduplication.
///
/// Strips `www.`, fragments (including text fragments), trailing slashes,
/// tracking parameters, and sorts the remaining query parameters so that
/// equivalent URLs compare equal. Idempotent: canonicalizing a canonical URL
/// is a no-op.
pub fn canonicalize(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim()).with_context(|| format!("invalid URL: {raw}"))?;

    if let Some(host) = url.host_str() {
        if let Some(stripped) = host.strip_prefix("www.") {
            let stripped = stripped.to_string();
            url.set_host(Some(&stripped))
                .with_context(|| format!("invalid host after www strip: {stripped}"))?;
        }
    }

    // Covers both #section anchors and #:~:text= text fragments.
    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if params.is_empty() {
        url.set_query(None);
    } else {
        let query = params
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut out = url.to_string();
    // A lone "/" path and trailing slashes are not significant.
    while out.ends_with('/') {
        out.pop();
    }

    Ok(out)
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    if lower.starts_with("utm_") && lower.len() > 4 {
        return true;
    }
    TRACKING_PARAMS.contains(&lower.as_str())
}

/// Build a filesystem basename from a URL, optionally preferring a slugified
/// title when the URL path says nothing about the content
/// (`news.ycombinator.com/item?id=1` → `news.ycombinator.com-hello-world`).
pub fn basename_from_url(raw: &str, title: Option<&str>) -> String {
    let parsed = Url::parse(raw).ok();
    let (host, path) = match &parsed {
        Some(u) => (
            u.host_str().unwrap_or("").trim_start_matches("www."),
            u.path().trim_matches('/'),
        ),
        None => ("", raw.trim_matches('/')),
    };

    let last_segment = path.rsplit('/').next().unwrap_or("");
    let use_title = title.is_some()
        && (path.is_empty() || NON_DESCRIPTIVE_SEGMENTS.contains(&last_segment.to_lowercase().as_str()));

    let name = if use_title {
        let slug = slugify(title.unwrap());
        if slug.is_empty() {
            path.replace('/', "-")
        } else {
            slug
        }
    } else {
        path.replace('/', "-")
    };

    if name.is_empty() {
        host.to_string()
    } else {
        format!("{host}-{name}")
    }
}

/// Lowercase, drop apostrophes, replace every other non-alphanumeric run with
/// a single hyphen, truncate to 50 chars.
pub fn slugify(title: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = true;
    for c in title.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('-');
            last_was_sep = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(50);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Remove path-unsafe characters from a filename and cap its length.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let mut out: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    out = out.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace()).to_string();
    if out.len() > max_len {
        let mut end = max_len;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out
}

/// Whether a URL points at a raw asset endpoint rather than a web page.
pub fn is_asset_url(url: &str) -> bool {
    url.contains("/api/assets/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_www() {
        assert_eq!(
            canonicalize("https://www.example.com/a").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let urls = [
            "https://www.example.com/a/?utm_source=x&b=2&a=1#frag",
            "https://example.com",
            "https://example.com/path/?ref=feed",
            "https://sub.example.com/x?z=1&y=2",
        ];
        for u in urls {
            let once = canonicalize(u).unwrap();
            let twice = canonicalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {u}");
        }
    }

    #[test]
    fn canonicalize_www_equivalence() {
        let with = canonicalize("https://www.example.com/a?b=1").unwrap();
        let without = canonicalize("https://example.com/a?b=1").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn canonicalize_drops_tracking_params_and_sorts() {
        let got = canonicalize(
            "https://example.com/read?utm_campaign=x&b=2&fbclid=abc&a=1&gclid=1&msclkid=2&source=rss",
        )
        .unwrap();
        assert_eq!(got, "https://example.com/read?a=1&b=2");
    }

    #[test]
    fn canonicalize_keeps_non_tracking_ref_like_params() {
        // "referrer" is not in the tracking table, only exact "ref" is.
        let got = canonicalize("https://example.com/a?referrer=x&ref=y").unwrap();
        assert_eq!(got, "https://example.com/a?referrer=x");
    }

    #[test]
    fn canonicalize_strips_lone_slash() {
        assert_eq!(
            canonicalize("https://example.com/").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn canonicalize_strips_text_fragment() {
        assert_eq!(
            canonicalize("https://example.com/a#:~:text=hello").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn basename_uses_path_when_descriptive() {
        assert_eq!(
            basename_from_url("https://example.com/some/long-article", None),
            "example.com-some-long-article"
        );
    }

    #[test]
    fn basename_prefers_title_for_nondescriptive_path() {
        assert_eq!(
            basename_from_url("https://news.ycombinator.com/item?id=1", Some("Hello World")),
            "news.ycombinator.com-hello-world"
        );
    }

    #[test]
    fn basename_falls_back_to_host_for_empty_path() {
        assert_eq!(basename_from_url("https://example.com", None), "example.com");
    }

    #[test]
    fn slugify_strips_apostrophes_and_collapses() {
        assert_eq!(slugify("Don't Stop -- Believin'!"), "dont-stop-believin");
    }

    #[test]
    fn slugify_truncates_to_50() {
        let long = "a ".repeat(60);
        assert!(slugify(&long).len() <= 50);
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_filename("a/b:c?d", 100), "a-b-c-d");
    }

    #[test]
    fn sanitize_truncates() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_filename(&long, 100).len(), 100);
    }

    #[test]
    fn asset_url_detection() {
        assert!(is_asset_url("https://reader.example.com/api/assets/abc123"));
        assert!(!is_asset_url("https://example.com/post/1"));
    }
}
