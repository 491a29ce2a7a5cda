//! Headless browser infrastructure: singleton pool, cookie store, and the
//! page capture protocol.

mod capture;
mod cookies;
mod pool;

pub use capture::{is_social_url, rewrite_url, trim_title, CaptureConfig, CaptureResult, Capturer};
pub use cookies::{
    parse_cookies, serialize_cookies, validate_cookies_content, Cookie, CookieStore,
};
pub use pool::{BrowserPool, DESKTOP_USER_AGENT, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};
