//! Netscape cookies.txt parsing and caching.
//!
//! The cookie file is written by an external upload collaborator; captures
//! read it through [`CookieStore`], which reloads when the file's mtime
//! changes.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One parsed cookie. The leading dot on `domain` is preserved: it marks
/// an include-subdomains cookie in the browser protocol too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; 0 means a session cookie.
    pub expires: i64,
    pub name: String,
    pub value: String,
}

/// Parse Netscape cookies.txt content.
///
/// Tab-separated `domain, include_subdomains, path, secure, expiration,
/// name, value`; `#`-prefixed comments and short lines are skipped.
pub fn parse_cookies(content: &str) -> Vec<Cookie> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                return None;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                return None;
            }
            Some(Cookie {
                domain: fields[0].to_string(),
                include_subdomains: fields[1].eq_ignore_ascii_case("TRUE"),
                path: fields[2].to_string(),
                secure: fields[3].eq_ignore_ascii_case("TRUE"),
                expires: fields[4].parse().unwrap_or(0),
                name: fields[5].to_string(),
                value: fields[6..].join("\t"),
            })
        })
        .collect()
}

/// Serialize cookies back to Netscape format.
pub fn serialize_cookies(cookies: &[Cookie]) -> String {
    let mut out = String::from("# Netscape HTTP Cookie File\n");
    for c in cookies {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            c.domain,
            if c.include_subdomains { "TRUE" } else { "FALSE" },
            c.path,
            if c.secure { "TRUE" } else { "FALSE" },
            c.expires,
            c.name,
            c.value
        ));
    }
    out
}

/// Validate uploaded cookies.txt content: at least one non-comment line
/// with at least 7 tab-separated fields.
pub fn validate_cookies_content(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim_end_matches('\r');
        !line.trim().is_empty() && !line.starts_with('#') && line.split('\t').count() >= 7
    })
}

struct CacheState {
    cookies: Vec<Cookie>,
    mtime: Option<SystemTime>,
}

/// Cached view of the cookie file, reloaded on mtime change.
pub struct CookieStore {
    path: PathBuf,
    state: Mutex<CacheState>,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(CacheState {
                cookies: Vec::new(),
                mtime: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cookies, reloading the file first if it changed.
    ///
    /// A missing or unreadable file is not an error: captures proceed
    /// without cookies and the problem is logged once per change.
    pub async fn load(&self) -> Vec<Cookie> {
        let mut state = self.state.lock().await;

        let mtime = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());

        if mtime == state.mtime && mtime.is_some() {
            return state.cookies.clone();
        }

        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                state.cookies = parse_cookies(&content);
                state.mtime = mtime;
                debug!(
                    path = %self.path.display(),
                    count = state.cookies.len(),
                    "cookie file loaded"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                state.cookies.clear();
                state.mtime = None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read cookie file");
                state.cookies.clear();
                state.mtime = None;
            }
        }

        state.cookies.clone()
    }

    /// Validate and write uploaded cookie content to the file.
    pub async fn upload(&self, content: &str) -> Result<usize> {
        if !validate_cookies_content(content) {
            anyhow::bail!(
                "cookie upload rejected: expected at least one non-comment line with 7 tab-separated fields"
            );
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;
        Ok(parse_cookies(content).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Netscape HTTP Cookie File\n\
# comment line\n\
.example.com\tTRUE\t/\tTRUE\t1999999999\tsession\tabc123\n\
news.site.org\tFALSE\t/reader\tFALSE\t0\tpref\tdark\n\
short\tline\n";

    #[test]
    fn parses_valid_lines_only() {
        let cookies = parse_cookies(SAMPLE);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].domain, ".example.com");
        assert!(cookies[0].include_subdomains);
        assert!(cookies[0].secure);
        assert_eq!(cookies[0].expires, 1999999999);
        assert_eq!(cookies[1].name, "pref");
        assert_eq!(cookies[1].value, "dark");
        assert!(!cookies[1].secure);
    }

    #[test]
    fn leading_dot_is_preserved() {
        let cookies = parse_cookies(".x.com\tTRUE\t/\tFALSE\t0\tn\tv\n");
        assert_eq!(cookies[0].domain, ".x.com");
    }

    #[test]
    fn value_may_contain_tabs() {
        let cookies = parse_cookies("a.com\tFALSE\t/\tFALSE\t0\tn\tv1\tv2\n");
        assert_eq!(cookies[0].value, "v1\tv2");
    }

    #[test]
    fn roundtrip_preserves_cookie_set() {
        let parsed = parse_cookies(SAMPLE);
        let reparsed = parse_cookies(&serialize_cookies(&parsed));
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn validation_rejects_comment_only_content() {
        assert!(!validate_cookies_content("# only comments\n# here\n"));
        assert!(!validate_cookies_content(""));
        assert!(!validate_cookies_content("too\tfew\tfields\n"));
        assert!(validate_cookies_content(SAMPLE));
    }

    #[tokio::test]
    async fn store_reloads_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        let store = CookieStore::new(&path);

        assert!(store.load().await.is_empty());

        tokio::fs::write(&path, ".a.com\tTRUE\t/\tFALSE\t0\tn\tv\n")
            .await
            .unwrap();
        // Force a different mtime on coarse-grained filesystems.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.load().await.len(), 1);

        tokio::fs::write(
            &path,
            ".a.com\tTRUE\t/\tFALSE\t0\tn\tv\n.b.com\tTRUE\t/\tFALSE\t0\tm\tw\n",
        )
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.load().await.len(), 2);
    }

    #[tokio::test]
    async fn upload_rejects_invalid_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path().join("cookies.txt"));
        assert!(store.upload("# nothing useful\n").await.is_err());
        assert!(!store.path().exists());
        let n = store
            .upload(".a.com\tTRUE\t/\tFALSE\t0\tn\tv\n")
            .await
            .unwrap();
        assert_eq!(n, 1);
    }
}
