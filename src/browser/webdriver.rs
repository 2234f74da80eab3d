use super::{close, Browser, BrowserError, BrowserLauncher, POLL_INTERVAL};
use crate::config::Config;
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 800;

const SCROLL_INTO_VIEW: &str = "document.querySelector(arguments[0]).scrollIntoView(true);";

/// Launches headless Chromium sessions through a running WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    webdriver_url: String,
    browser_binary: Option<PathBuf>,
    page_load_timeout: Duration,
}

impl WebDriverLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            browser_binary: config.chrome_browser_path.clone(),
            page_load_timeout: config.page_load_timeout,
        }
    }

    fn capabilities(&self, proxy: Option<&ProxyEndpoint>) -> WebDriverResult<ChromeCapabilities> {
        let mut caps = DesiredCapabilities::chrome();
        for arg in ["--headless", "--no-sandbox", "--disable-gpu", "--lang=ja"] {
            caps.add_arg(arg)?;
        }
        if let Some(proxy) = proxy {
            caps.add_arg(&format!("--proxy-server={}", proxy.as_str()))?;
        }
        if let Some(binary) = &self.browser_binary {
            caps.set_binary(&binary.to_string_lossy())?;
        }
        Ok(caps)
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    type Session = WebDriverBrowser;

    async fn launch(&self, proxy: Option<&ProxyEndpoint>) -> Result<Self::Session, BrowserError> {
        let launch_err = |e: WebDriverError| BrowserError::Launch(e.to_string());

        let caps = self.capabilities(proxy).map_err(launch_err)?;
        let driver = WebDriver::new(&self.webdriver_url, caps)
            .await
            .map_err(launch_err)?;

        let browser = WebDriverBrowser { driver };
        if let Err(e) = browser.configure(self.page_load_timeout).await {
            // The session exists at this point; don't leak it.
            close(&browser, "launch").await;
            return Err(e);
        }

        tracing::debug!(
            proxy = proxy.map(ProxyEndpoint::as_str).unwrap_or("direct"),
            "Browser session started"
        );
        Ok(browser)
    }
}

enum Condition<'a> {
    Present(&'a str),
    Clickable(&'a str),
    Text(&'a str, &'a str),
}

impl Condition<'_> {
    fn describe(&self) -> String {
        match self {
            Condition::Present(css) => format!("{css} to be present"),
            Condition::Clickable(css) => format!("{css} to be clickable"),
            Condition::Text(css, text) => format!("{css} to contain '{text}'"),
        }
    }
}

/// A `thirtyfour` session.
pub struct WebDriverBrowser {
    driver: WebDriver,
}

impl WebDriverBrowser {
    async fn configure(&self, page_load_timeout: Duration) -> Result<(), BrowserError> {
        self.driver
            .set_window_rect(0, 0, WINDOW_WIDTH, WINDOW_HEIGHT)
            .await
            .map_err(driver_err)?;
        self.driver
            .set_page_load_timeout(page_load_timeout)
            .await
            .map_err(driver_err)?;
        Ok(())
    }

    async fn find_named(&self, name: &str) -> Result<WebElement, BrowserError> {
        self.driver
            .find(By::Name(name))
            .await
            .map_err(|_| BrowserError::ElementMissing(format!("[name={name}]")))
    }

    /// Lookup failures count as "not yet" while polling.
    async fn holds(&self, condition: &Condition<'_>) -> bool {
        match condition {
            Condition::Present(css) => self.driver.find(By::Css(*css)).await.is_ok(),
            Condition::Clickable(css) => match self.driver.find(By::Css(*css)).await {
                Ok(element) => element.is_clickable().await.unwrap_or(false),
                Err(_) => false,
            },
            Condition::Text(css, text) => {
                let Ok(elements) = self.driver.find_all(By::Css(*css)).await else {
                    return false;
                };
                for element in elements {
                    if let Ok(content) = element.text().await {
                        if content.contains(text) {
                            return true;
                        }
                    }
                }
                false
            }
        }
    }

    async fn wait_for(
        &self,
        condition: Condition<'_>,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.holds(&condition).await {
                return Ok(());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(BrowserError::Timeout {
                    condition: condition.describe(),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

fn driver_err(e: WebDriverError) -> BrowserError {
    BrowserError::Driver(e.to_string())
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.driver.title().await.map_err(driver_err)
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.driver.source().await.map_err(driver_err)
    }

    async fn wait_present(&self, css: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.wait_for(Condition::Present(css), timeout).await
    }

    async fn wait_clickable(&self, css: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.wait_for(Condition::Clickable(css), timeout).await
    }

    async fn wait_text(
        &self,
        css: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.wait_for(Condition::Text(css, text), timeout).await
    }

    async fn fill(&self, name: &str, text: &str) -> Result<(), BrowserError> {
        self.find_named(name)
            .await?
            .send_keys(text)
            .await
            .map_err(driver_err)
    }

    async fn clear(&self, name: &str) -> Result<(), BrowserError> {
        self.find_named(name).await?.clear().await.map_err(driver_err)
    }

    async fn click_named(&self, name: &str) -> Result<(), BrowserError> {
        self.find_named(name).await?.click().await.map_err(driver_err)
    }

    async fn click_css(&self, css: &str) -> Result<(), BrowserError> {
        self.driver
            .find(By::Css(css))
            .await
            .map_err(|_| BrowserError::ElementMissing(css.to_string()))?
            .click()
            .await
            .map_err(driver_err)
    }

    async fn scroll_into_view(&self, css: &str) -> Result<(), BrowserError> {
        self.driver
            .execute(SCROLL_INTO_VIEW, vec![serde_json::Value::from(css)])
            .await
            .map(|_| ())
            .map_err(driver_err)
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.driver.screenshot_as_png().await.map_err(driver_err)
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        self.driver.clone().quit().await.map_err(driver_err)
    }
}
