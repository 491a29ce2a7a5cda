//! Process-wide headless browser singleton.
//!
//! Lifecycle is `init → running → closed`; `init` and `close` are
//! idempotent, `get` fails fast when the browser is not running. Captures
//! allocate isolated browser contexts from the shared instance and release
//! them through [`super::capture::CaptureGuard`].

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Desktop user agent presented by every capture context.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 800;

enum PoolState {
    Idle,
    Running {
        browser: Arc<Browser>,
        handler_task: JoinHandle<()>,
    },
    Closed,
}

/// Owner of the singleton browser process.
pub struct BrowserPool {
    state: Mutex<PoolState>,
}

impl BrowserPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::Idle),
        }
    }

    /// Launch the browser. Calling `init` on a running pool is a no-op.
    pub async fn init(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match &*state {
            PoolState::Running { .. } => return Ok(()),
            PoolState::Closed => {
                // A closed pool may be re-initialized (e.g. in tests).
                debug!("re-initializing closed browser pool");
            }
            PoolState::Idle => {}
        }

        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .viewport(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                ..Default::default()
            })
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch headless browser")?;

        // The handler stream must be driven for the CDP connection to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        info!("headless browser launched");
        *state = PoolState::Running {
            browser: Arc::new(browser),
            handler_task,
        };
        Ok(())
    }

    /// Shared handle to the running browser.
    pub async fn get(&self) -> Result<Arc<Browser>> {
        let state = self.state.lock().await;
        match &*state {
            PoolState::Running { browser, .. } => Ok(browser.clone()),
            PoolState::Idle => Err(anyhow!("browser pool not initialized")),
            PoolState::Closed => Err(anyhow!("browser pool is closed")),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, PoolState::Running { .. })
    }

    /// Shut the browser down. Idempotent; in-flight captures should be
    /// drained first (the shutdown sequence closes the browser last).
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let PoolState::Running {
            browser,
            handler_task,
        } = std::mem::replace(&mut *state, PoolState::Closed)
        {
            if let Err(e) = browser.execute(CloseParams::default()).await {
                warn!(error = %e, "browser close command failed");
            }
            handler_task.abort();
            info!("headless browser closed");
        }
    }
}

impl Default for BrowserPool {
    fn default() -> Self {
        Self::new()
    }
}
