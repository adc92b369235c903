//! Headless browser session lifecycle.
//!
//! Exactly one [`BrowserSession`] exists per pipeline run. It owns the
//! headless Chrome instance; per-route tabs are ephemeral children created
//! and closed by the render state machine within a single route.
//!
//! The launch options target constrained and containerized hosts: no
//! sandbox, no GPU, software rasterization only. An explicit binary path
//! may be supplied; otherwise `headless_chrome` auto-detects an installed
//! Chrome/Chromium.

use std::path::Path;
use std::sync::Arc;

use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::error::{PrerenderError, Result};

/// Build launch options for sandboxless, GPU-less headless rendering.
///
/// # Chrome Flags Applied
///
/// - `--disable-gpu`, `--disable-gpu-compositing`,
///   `--disable-software-rasterizer`, `--disable-accelerated-2d-canvas`:
///   force software rendering, required on hosts without a GPU
/// - `--disable-dev-shm-usage`: use /tmp instead of /dev/shm
///   (container-friendly)
/// - `--disable-crash-reporter`, `--disable-extensions`, `--disable-sync`,
///   `--disable-default-apps`: strip features a snapshot run never needs
/// - `--disable-background-timer-throttling`,
///   `--disable-renderer-backgrounding`, `--disable-hang-monitor`: keep
///   the single rendering tab fully scheduled
///
/// # Errors
///
/// Returns [`PrerenderError::Configuration`] if the options builder
/// rejects the combination (rare, usually a bug).
pub fn create_launch_options(chrome_path: Option<&Path>) -> Result<LaunchOptions<'static>> {
    match chrome_path {
        Some(path) => log::debug!("building launch options with explicit binary {:?}", path),
        None => log::debug!("building launch options (auto-detect browser binary)"),
    }

    let mut builder = LaunchOptions::default_builder();

    if let Some(path) = chrome_path {
        builder.path(Some(path.to_path_buf()));
    }

    builder
        .headless(true)
        .sandbox(false) // required in containers
        .args(vec![
            "--disable-gpu".as_ref(),
            "--disable-gpu-compositing".as_ref(),
            "--disable-software-rasterizer".as_ref(),
            "--disable-accelerated-2d-canvas".as_ref(),
            "--disable-dev-shm-usage".as_ref(),
            "--disable-crash-reporter".as_ref(),
            "--disable-extensions".as_ref(),
            "--disable-sync".as_ref(),
            "--disable-default-apps".as_ref(),
            "--disable-background-timer-throttling".as_ref(),
            "--disable-renderer-backgrounding".as_ref(),
            "--disable-hang-monitor".as_ref(),
        ])
        .build()
        .map_err(|e| PrerenderError::Configuration(format!("invalid launch options: {}", e)))
}

/// The single headless engine instance for a run.
///
/// Created by [`launch`](Self::launch); released by [`close`](Self::close)
/// or on drop. Closing is idempotent and tolerates a session that never
/// successfully opened.
pub struct BrowserSession {
    /// `None` once closed.
    browser: Option<Browser>,
}

impl BrowserSession {
    /// Launch headless Chrome.
    ///
    /// # Errors
    ///
    /// [`PrerenderError::BrowserLaunch`] if the engine cannot be started;
    /// fatal for the whole run.
    pub fn launch(chrome_path: Option<&Path>) -> Result<Self> {
        let options = create_launch_options(chrome_path)?;

        log::info!("launching headless browser");
        let browser = Browser::new(options).map_err(|e| {
            log::error!("browser launch failed: {}", e);
            PrerenderError::BrowserLaunch(e.to_string())
        })?;

        Ok(Self {
            browser: Some(browser),
        })
    }

    /// Open a fresh page context.
    ///
    /// # Errors
    ///
    /// [`PrerenderError::BrowserLaunch`] if the session is closed or the
    /// engine refuses a new tab.
    pub fn new_tab(&self) -> Result<Arc<Tab>> {
        let browser = self.browser.as_ref().ok_or_else(|| {
            PrerenderError::BrowserLaunch("session already closed".to_string())
        })?;

        browser
            .new_tab()
            .map_err(|e| PrerenderError::BrowserLaunch(format!("failed to open tab: {}", e)))
    }

    /// Close the session exactly once.
    ///
    /// Dropping the inner browser ends the CDP connection and kills the
    /// Chrome process. Subsequent calls are no-ops.
    pub fn close(&mut self) {
        match self.browser.take() {
            Some(browser) => {
                log::info!("closing browser session");
                drop(browser);
            }
            None => log::trace!("browser session already closed"),
        }
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.browser.is_none()
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_create_launch_options_auto_detect() {
        let result = create_launch_options(None);
        assert!(result.is_ok(), "auto-detect options should build: {:?}", result.err());
    }

    #[test]
    fn test_create_launch_options_with_path() {
        let path = PathBuf::from("/custom/chrome/path");
        let result = create_launch_options(Some(&path));
        assert!(result.is_ok());
    }

    #[test]
    fn test_closed_session_rejects_new_tab() {
        let mut session = BrowserSession { browser: None };
        assert!(session.is_closed());
        assert!(matches!(
            session.new_tab(),
            Err(PrerenderError::BrowserLaunch(_))
        ));

        // close on a never-opened/already-closed session is a no-op
        session.close();
        session.close();
        assert!(session.is_closed());
    }
}
