//! Browser automation seam.
//!
//! Everything that drives a page goes through [`Browser`], so the posting state
//! machine and the proxy listing scrape can run against a scripted fake in tests.
//! The production implementation talks to a WebDriver server via `thirtyfour`.

mod webdriver;

pub use webdriver::{WebDriverBrowser, WebDriverLauncher};

use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Polling interval for in-page condition waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum BrowserError {
    /// A bounded wait for an in-page condition elapsed.
    #[error("Timed out after {timeout:?} waiting for {condition}")]
    Timeout {
        condition: String,
        timeout: Duration,
    },
    /// Navigation did not complete (page-load timeout, unreachable proxy).
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("Element not found: {0}")]
    ElementMissing(String),
    #[error("Could not start browser session: {0}")]
    Launch(String),
    #[error("WebDriver error: {0}")]
    Driver(String),
}

impl BrowserError {
    /// Timeouts and failed navigations are attributed to the current proxy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout { .. } | BrowserError::Navigation { .. }
        )
    }
}

/// One live browser session.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    async fn page_source(&self) -> Result<String, BrowserError>;

    /// Wait until an element matching `css` exists.
    async fn wait_present(&self, css: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Wait until an element matching `css` is displayed and enabled.
    async fn wait_clickable(&self, css: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Wait until an element matching `css` contains `text`.
    async fn wait_text(&self, css: &str, text: &str, timeout: Duration)
        -> Result<(), BrowserError>;

    /// Type into the form field named `name`.
    async fn fill(&self, name: &str, text: &str) -> Result<(), BrowserError>;

    /// Clear the form field named `name`.
    async fn clear(&self, name: &str) -> Result<(), BrowserError>;

    async fn click_named(&self, name: &str) -> Result<(), BrowserError>;

    async fn click_css(&self, css: &str) -> Result<(), BrowserError>;

    async fn scroll_into_view(&self, css: &str) -> Result<(), BrowserError>;

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;

    /// End the session. Called exactly once per session, whatever the outcome.
    async fn quit(&self) -> Result<(), BrowserError>;
}

/// Starts fresh browser sessions, optionally routed through a proxy.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: Browser;

    async fn launch(&self, proxy: Option<&ProxyEndpoint>) -> Result<Self::Session, BrowserError>;
}

/// End the session. A failed teardown is logged, never returned.
pub async fn close<B: Browser + ?Sized>(browser: &B, session: &str) {
    if let Err(e) = browser.quit().await {
        tracing::warn!(session = %session, error = %e, "Failed to close browser session");
    }
}

/// Scroll `css` into view, then click it.
pub async fn scroll_and_click<B: Browser + ?Sized>(
    browser: &B,
    css: &str,
) -> Result<(), BrowserError> {
    browser.scroll_into_view(css).await?;
    browser.click_css(css).await
}
