//! Page capture protocol: isolated context, cookie injection, navigation
//! with fallback, lazy-load scrolling, privacy filtering, screenshot and
//! PDF generation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetEmulatedMediaParams;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use tracing::{debug, warn};
use url::Url;

use super::cookies::CookieStore;
use super::pool::{BrowserPool, DESKTOP_USER_AGENT};
use crate::kernel::jobs::FailureKind;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const BODY_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const SCROLL_TIMEOUT: Duration = Duration::from_secs(10);
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(15);

/// Body substring marking an unsupported long-form article stub on the
/// social mirror; triggers a direct capture of the original URL.
const ARTICLE_STUB_MARKER: &str = "/i/article";

/// Site suffixes trimmed from extracted page titles.
const TITLE_SUFFIXES: &[&str] = &[
    " | Substack",
    " – Medium",
    " - Medium",
    " / X",
    " on X",
    " | Twitter",
];

/// Hosts handled through the configured social mirror.
const SOCIAL_HOSTS: &[&str] = &["twitter.com", "x.com", "mobile.twitter.com"];

/// Publisher platform whose tracking query parameters are stripped before
/// navigation (its share links carry per-recipient identifiers).
const PUBLISHER_TRACKING_HOST: &str = "medium.com";
const PUBLISHER_TRACKING_PARAMS: &[&str] = &["sk", "source", "gi", "postPublishedType"];

/// Capture settings derived from configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub social_mirror_host: String,
    /// Lowercased terms whose containing blocks are hidden before capture.
    pub privacy_filter_terms: Vec<String>,
}

/// Output of a successful capture.
#[derive(Debug)]
pub struct CaptureResult {
    pub pdf: Vec<u8>,
    /// Viewport screenshot; empty when the screenshot step failed.
    pub screenshot: Vec<u8>,
    pub title: Option<String>,
    /// The URL actually navigated to, after rewrites.
    pub final_url: String,
    /// Set when a social article stub forced a direct capture of the
    /// original URL.
    pub direct_article: bool,
}

// ---------------------------------------------------------------------------
// URL rewriting (pure)
// ---------------------------------------------------------------------------

fn host_matches(host: &str, candidate: &str) -> bool {
    host == candidate || host.ends_with(&format!(".{candidate}"))
}

/// Whether the URL belongs to the recognized social-media platform.
pub fn is_social_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| {
            let h = h.trim_start_matches("www.");
            SOCIAL_HOSTS.iter().any(|s| host_matches(h, s))
        }))
        .unwrap_or(false)
}

/// Apply pre-navigation rewrites. Returns the target URL and whether any
/// rewrite happened.
pub fn rewrite_url(url: &str, mirror_host: &str) -> (String, bool) {
    let Ok(mut parsed) = Url::parse(url) else {
        return (url.to_string(), false);
    };
    let Some(host) = parsed.host_str().map(|h| h.trim_start_matches("www.").to_string()) else {
        return (url.to_string(), false);
    };

    // (a) publisher platform: drop per-recipient tracking parameters
    if host_matches(&host, PUBLISHER_TRACKING_HOST) {
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| !PUBLISHER_TRACKING_PARAMS.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let changed = kept.len() != parsed.query_pairs().count();
        if changed {
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                let q = kept
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&");
                parsed.set_query(Some(&q));
            }
            return (parsed.to_string(), true);
        }
        return (url.to_string(), false);
    }

    // (b) chart-embed wrapper → CDN embed form
    if host_matches(&host, "datawrapper.de") {
        let segments: Vec<&str> = parsed.path().trim_matches('/').split('/').collect();
        if segments.len() >= 2 && segments[0] == "_" && !segments[1].is_empty() {
            return (
                format!("https://datawrapper.dwcdn.net/{}/", segments[1]),
                true,
            );
        }
        return (url.to_string(), false);
    }

    // (c) social-media domain → configured mirror
    if SOCIAL_HOSTS.iter().any(|s| host_matches(&host, s)) {
        let path = parsed.path().to_string();
        let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();
        return (format!("https://{mirror_host}{path}{query}"), true);
    }

    (url.to_string(), false)
}

/// Trim known site suffixes from an extracted page title.
pub fn trim_title(title: &str) -> String {
    let mut out = title.trim();
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = out.strip_suffix(suffix) {
            out = stripped.trim_end();
            break;
        }
    }
    out.to_string()
}

// ---------------------------------------------------------------------------
// Injected scripts
// ---------------------------------------------------------------------------

/// Bounded scroll to trigger lazy loading: up to 50 steps of 1000px with a
/// 50ms pause, capped at 10s, then back to the top.
const SCROLL_SCRIPT: &str = r#"(async () => {
    const deadline = Date.now() + 10000;
    for (let i = 0; i < 50; i++) {
        if (Date.now() > deadline) break;
        window.scrollBy(0, 1000);
        await new Promise(r => setTimeout(r, 50));
        if (window.innerHeight + window.scrollY >= document.body.scrollHeight) break;
    }
    window.scrollTo(0, 0);
    return true;
})()"#;

/// Print-preparation styles: keep colors, hide fixed chrome and overlays,
/// wrap overflowing elements, normalize footnote markers.
const PRINT_STYLE_SCRIPT: &str = r#"(() => {
    const css = `
        * { -webkit-print-color-adjust: exact !important; print-color-adjust: exact !important; }
        header, nav, footer, aside,
        [class*="header" i][style*="fixed"], [class*="nav" i][style*="fixed"],
        [class*="sidebar" i], [class*="banner" i][style*="fixed"],
        [style*="position: fixed"], [style*="position:fixed"],
        [style*="position: sticky"], [style*="position:sticky"] { display: none !important; }
        pre, code, table, blockquote { overflow-wrap: break-word !important; white-space: pre-wrap !important; }
        img, video, iframe { max-width: 100% !important; }
        sup, sub { vertical-align: baseline !important; font-size: 0.75em !important; }
        [role="tooltip"], [class*="footnote-tooltip" i] { display: none !important; }
        [role="dialog"], [class*="modal" i], [class*="overlay" i][style*="fixed"] { display: none !important; }
    `;
    const style = document.createElement('style');
    style.textContent = css;
    document.head.appendChild(style);
    return true;
})()"#;

/// Hide the nearest block-level ancestor of any text node containing a
/// filter term, skipping known content containers.
fn privacy_filter_script(terms: &[String]) -> String {
    let terms_json = serde_json::to_string(terms).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
    const terms = {terms_json};
    if (!terms.length || !document.body) return 0;
    const contentIds = ['content', 'main', 'article', 'post-body', 'story'];
    const blockTags = ['DIV','SPAN','P','LI','A','SECTION','ARTICLE','ASIDE'];
    const isBlock = (el) => {{
        const d = getComputedStyle(el).display;
        return d === 'block' || d === 'flex' || d === 'grid' || blockTags.includes(el.tagName);
    }};
    const isContentContainer = (el) =>
        contentIds.some(id => (el.id || '').toLowerCase().includes(id));
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
    let hidden = 0;
    const nodes = [];
    while (walker.nextNode()) nodes.push(walker.currentNode);
    for (const node of nodes) {{
        const text = (node.textContent || '').toLowerCase();
        if (!terms.some(t => text.includes(t))) continue;
        let el = node.parentElement;
        while (el && el !== document.body) {{
            if (isBlock(el) && !isContentContainer(el)) {{
                el.style.display = 'none';
                hidden++;
                break;
            }}
            el = el.parentElement;
        }}
    }}
    return hidden;
}})()"#
    )
}

// ---------------------------------------------------------------------------
// Capture guard
// ---------------------------------------------------------------------------

/// RAII guard for a capture's page and browser context.
///
/// Prefer the explicit async [`CaptureGuard::close`]; the `Drop` fallback
/// spawns background cleanup so error paths cannot leak contexts.
struct CaptureGuard {
    browser: Arc<Browser>,
    page: Option<Page>,
    context_id: Option<chromiumoxide::cdp::browser_protocol::browser::BrowserContextId>,
}

impl CaptureGuard {
    async fn create(browser: Arc<Browser>) -> Result<Self> {
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?;
        let context_id = created.result.browser_context_id.clone();

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow!("failed to build target params: {e}"))?;
        let page = browser
            .new_page(target)
            .await
            .context("failed to open page")?;

        Ok(Self {
            browser,
            page: Some(page),
            context_id: Some(context_id),
        })
    }

    fn page(&self) -> &Page {
        self.page.as_ref().expect("capture guard already closed")
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close capture page");
            }
        }
        if let Some(context_id) = self.context_id.take() {
            if let Err(e) = self
                .browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
            {
                warn!(error = %e, "failed to dispose browser context");
            }
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let page = self.page.take();
        let context_id = self.context_id.take();
        if page.is_none() && context_id.is_none() {
            return;
        }
        let browser = self.browser.clone();
        tokio::spawn(async move {
            if let Some(page) = page {
                let _ = page.close().await;
            }
            if let Some(context_id) = context_id {
                let _ = browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await;
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Capturer
// ---------------------------------------------------------------------------

/// Runs the capture protocol against the shared browser.
pub struct Capturer {
    pool: Arc<BrowserPool>,
    cookies: Arc<CookieStore>,
    config: CaptureConfig,
}

impl Capturer {
    pub fn new(pool: Arc<BrowserPool>, cookies: Arc<CookieStore>, config: CaptureConfig) -> Self {
        Self {
            pool,
            cookies,
            config,
        }
    }

    /// Capture `url` as PDF + screenshot.
    ///
    /// Errors carry a `"{kind}: {message}"` reason so the conversion worker
    /// can propagate them into the queue unchanged.
    pub async fn capture(&self, url: &str) -> Result<CaptureResult> {
        let browser = self.pool.get().await?;
        let (target_url, rewritten) = rewrite_url(url, &self.config.social_mirror_host);
        if rewritten {
            debug!(original = %url, target = %target_url, "applied URL rewrite");
        }

        let guard = CaptureGuard::create(browser.clone()).await?;
        let result = self.capture_on_page(&guard, url, &target_url).await;
        guard.close().await;
        result
    }

    async fn capture_on_page(
        &self,
        guard: &CaptureGuard,
        original_url: &str,
        target_url: &str,
    ) -> Result<CaptureResult> {
        let page = guard.page();
        page.set_user_agent(DESKTOP_USER_AGENT)
            .await
            .context("failed to set user agent")?;
        self.inject_cookies(page).await?;

        self.navigate(page, target_url).await?;
        self.settle(page).await;
        self.apply_privacy_filter(page).await;

        // Social mirror may present an unsupported long-form article stub;
        // fall back to a direct capture of the original URL.
        let mut direct_article = false;
        let mut final_url = target_url.to_string();
        if is_social_url(original_url) && original_url != target_url {
            if self.body_contains(page, ARTICLE_STUB_MARKER).await {
                debug!(url = %original_url, "article stub detected, retrying original URL directly");
                self.navigate(page, original_url).await?;
                self.settle(page).await;
                self.apply_privacy_filter(page).await;
                direct_article = true;
                final_url = original_url.to_string();
            }
        }

        let screenshot = self.screenshot(page).await;
        self.prepare_for_print(page).await;
        let title = self.extract_title(page).await;
        let pdf = self.print_pdf(page).await?;

        Ok(CaptureResult {
            pdf,
            screenshot,
            title,
            final_url,
            direct_article,
        })
    }

    async fn inject_cookies(&self, page: &Page) -> Result<()> {
        let cookies = self.cookies.load().await;
        if cookies.is_empty() {
            return Ok(());
        }
        let mut params = Vec::with_capacity(cookies.len());
        for c in &cookies {
            let mut builder = CookieParam::builder()
                .name(&c.name)
                .value(&c.value)
                .domain(&c.domain)
                .path(&c.path)
                .secure(c.secure);
            if c.expires > 0 {
                builder = builder.expires(TimeSinceEpoch::new(c.expires as f64));
            }
            match builder.build() {
                Ok(param) => params.push(param),
                Err(e) => warn!(cookie = %c.name, error = %e, "skipping malformed cookie"),
            }
        }
        let count = params.len();
        if let Err(e) = page.set_cookies(params).await {
            warn!(error = %e, "cookie injection failed");
        } else {
            debug!(count, "cookies injected");
        }
        Ok(())
    }

    /// Navigate with a 60s deadline; on timeout retry once with a plain
    /// load wait and a 5s settle.
    async fn navigate(&self, page: &Page, url: &str) -> Result<()> {
        let first = tokio::time::timeout(NAVIGATION_TIMEOUT, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        match first {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(classify_navigation_error(&e.to_string())),
            Err(_elapsed) => {
                debug!(url = %url, "navigation timed out, retrying with load-only wait");
                let second = tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(url)).await;
                match second {
                    Ok(Ok(_)) => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(())
                    }
                    Ok(Err(e)) => Err(classify_navigation_error(&e.to_string())),
                    Err(_) => Err(FailureKind::Timeout
                        .error(format!("navigation to {url} exceeded 60s twice"))),
                }
            }
        }
    }

    /// Post-navigation waits and lazy-load scroll.
    async fn settle(&self, page: &Page) {
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Await <body>; ignore failure, the content checks will catch a
        // truly empty document.
        let deadline = tokio::time::Instant::now() + BODY_WAIT_TIMEOUT;
        loop {
            if page.find_element("body").await.is_ok() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        tokio::time::sleep(Duration::from_secs(2)).await;

        let scroll = EvaluateParams::builder()
            .expression(SCROLL_SCRIPT)
            .await_promise(true)
            .return_by_value(true)
            .build();
        if let Ok(params) = scroll {
            let _ = tokio::time::timeout(
                SCROLL_TIMEOUT + Duration::from_secs(2),
                page.evaluate(params),
            )
            .await;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    async fn apply_privacy_filter(&self, page: &Page) {
        if self.config.privacy_filter_terms.is_empty() {
            return;
        }
        let script = privacy_filter_script(&self.config.privacy_filter_terms);
        match page.evaluate(script).await {
            Ok(result) => {
                let hidden: i64 = result.into_value().unwrap_or(0);
                if hidden > 0 {
                    debug!(hidden, "privacy filter hid elements");
                }
            }
            Err(e) => warn!(error = %e, "privacy filter failed"),
        }
    }

    async fn body_contains(&self, page: &Page, needle: &str) -> bool {
        let script = format!(
            "document.body ? document.body.innerHTML.includes({}) : false",
            serde_json::to_string(needle).unwrap_or_default()
        );
        match page.evaluate(script).await {
            Ok(result) => result.into_value().unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Viewport screenshot; an empty buffer on failure keeps the capture
    /// going (the blank-page heuristic handles a missing screenshot).
    async fn screenshot(&self, page: &Page) -> Vec<u8> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        match tokio::time::timeout(SCREENSHOT_TIMEOUT, page.screenshot(params)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(error = %e, "screenshot failed, continuing without");
                Vec::new()
            }
            Err(_) => {
                warn!("screenshot timed out, continuing without");
                Vec::new()
            }
        }
    }

    async fn prepare_for_print(&self, page: &Page) {
        if let Err(e) = page
            .execute(SetEmulatedMediaParams::builder().media("screen").build())
            .await
        {
            warn!(error = %e, "failed to emulate screen media");
        }
        if let Err(e) = page.evaluate(PRINT_STYLE_SCRIPT).await {
            // Non-fatal: the PDF is still usable without the style tweaks.
            warn!(error = %e, "failed to inject print styles");
        }
    }

    async fn extract_title(&self, page: &Page) -> Option<String> {
        let title: Option<String> = match page.evaluate("document.title").await {
            Ok(result) => result.into_value().ok(),
            Err(_) => None,
        };
        title
            .map(|t| trim_title(&t))
            .filter(|t| !t.is_empty())
    }

    async fn print_pdf(&self, page: &Page) -> Result<Vec<u8>> {
        // 20px at 96dpi ≈ 0.208in margins; A4 paper.
        let params = PrintToPdfParams {
            print_background: Some(true),
            scale: Some(0.7),
            paper_width: Some(8.27),
            paper_height: Some(11.69),
            margin_top: Some(0.21),
            margin_bottom: Some(0.21),
            margin_left: Some(0.21),
            margin_right: Some(0.21),
            ..Default::default()
        };
        page.pdf(params)
            .await
            .map_err(|e| FailureKind::Unknown.error(format!("PDF generation failed: {e}")))
    }
}

/// Map a navigation error message to the failure taxonomy.
fn classify_navigation_error(message: &str) -> anyhow::Error {
    if message.contains("net::ERR_BLOCKED") || message.contains("403") {
        FailureKind::BotDetected.error(message)
    } else {
        FailureKind::NavigationError.error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::classify;

    #[test]
    fn social_url_detection() {
        assert!(is_social_url("https://twitter.com/user/status/1"));
        assert!(is_social_url("https://x.com/user/status/1"));
        assert!(is_social_url("https://www.x.com/user/status/1"));
        assert!(is_social_url("https://mobile.twitter.com/user/status/1"));
        assert!(!is_social_url("https://example.com/x.com"));
        assert!(!is_social_url("https://notx.com/a"));
    }

    #[test]
    fn social_rewrite_targets_mirror() {
        let (rewritten, changed) =
            rewrite_url("https://x.com/someone/status/123?s=20", "xcancel.com");
        assert!(changed);
        assert_eq!(rewritten, "https://xcancel.com/someone/status/123?s=20");
    }

    #[test]
    fn chart_wrapper_rewrites_to_cdn() {
        let (rewritten, changed) =
            rewrite_url("https://www.datawrapper.de/_/abC12/", "xcancel.com");
        assert!(changed);
        assert_eq!(rewritten, "https://datawrapper.dwcdn.net/abC12/");
    }

    #[test]
    fn publisher_tracking_params_are_stripped() {
        let (rewritten, changed) = rewrite_url(
            "https://medium.com/@a/story-1?sk=secret&keep=1",
            "xcancel.com",
        );
        assert!(changed);
        assert_eq!(rewritten, "https://medium.com/@a/story-1?keep=1");
    }

    #[test]
    fn unrelated_urls_pass_through() {
        let (rewritten, changed) = rewrite_url("https://example.com/a?b=1", "xcancel.com");
        assert!(!changed);
        assert_eq!(rewritten, "https://example.com/a?b=1");
    }

    #[test]
    fn title_suffixes_are_trimmed() {
        assert_eq!(trim_title("Great Post | Substack"), "Great Post");
        assert_eq!(trim_title("Thread / X"), "Thread");
        assert_eq!(trim_title("Plain Title"), "Plain Title");
    }

    #[test]
    fn navigation_error_classification() {
        let (kind, _) =
            classify(&classify_navigation_error("net::ERR_BLOCKED_BY_CLIENT").to_string());
        assert_eq!(kind, FailureKind::BotDetected);

        let (kind, _) = classify(&classify_navigation_error("HTTP 403 Forbidden").to_string());
        assert_eq!(kind, FailureKind::BotDetected);

        let (kind, _) =
            classify(&classify_navigation_error("net::ERR_NAME_NOT_RESOLVED").to_string());
        assert_eq!(kind, FailureKind::NavigationError);
    }

    #[test]
    fn privacy_script_embeds_terms() {
        let script = privacy_filter_script(&["alice".to_string(), "bob".to_string()]);
        assert!(script.contains("\"alice\""));
        assert!(script.contains("\"bob\""));
    }
}
