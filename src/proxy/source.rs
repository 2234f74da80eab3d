use super::{ProxyEndpoint, ProxyPool};
use crate::browser::{close, Browser, BrowserError, BrowserLauncher};
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;

/// The listing publishes proxies as links inside this list, best first.
const PROXY_LIST_SELECTOR: &str = r#"ol[style="list-style-type: none;"]"#;

#[derive(Debug, Error)]
pub enum ProxySourceError {
    /// The listing page could not be loaded after every retry.
    #[error("Proxy listing unavailable after {attempts} attempts: {source}")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: BrowserError,
    },
    #[error("No proxy found")]
    NoProxiesFound,
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Backoff schedule for loading the listing page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub tries: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            delay: Duration::from_secs(10),
            backoff: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): 10s, 15s, 22.5s, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.delay.mul_f64(self.backoff.powi(retry as i32))
    }
}

/// Scrapes the public proxy listing through a throwaway browser session.
pub struct ProxySource<'a, L: BrowserLauncher> {
    launcher: &'a L,
    url: &'a str,
    retry: RetryPolicy,
}

impl<'a, L: BrowserLauncher> ProxySource<'a, L> {
    pub fn new(launcher: &'a L, url: &'a str) -> Self {
        Self {
            launcher,
            url,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the listing and return the proxies in document order.
    pub async fn fetch(&self) -> Result<ProxyPool, ProxySourceError> {
        let browser = self.launcher.launch(None).await?;
        let result = self.scrape(&browser).await;
        close(&browser, "proxy listing").await;

        let proxies = result?;
        if proxies.is_empty() {
            return Err(ProxySourceError::NoProxiesFound);
        }
        tracing::info!(count = proxies.len(), "Fetched proxy list");
        Ok(ProxyPool::new(proxies))
    }

    async fn scrape(&self, browser: &L::Session) -> Result<Vec<ProxyEndpoint>, ProxySourceError> {
        let mut retry_count = 0;
        loop {
            match browser.goto(self.url).await {
                Ok(()) => break,
                Err(e) if retry_count + 1 < self.retry.tries => {
                    let delay = self.retry.delay_for(retry_count);
                    tracing::warn!(
                        url = %self.url,
                        error = %e,
                        retry = retry_count + 1,
                        delay_secs = delay.as_secs_f64(),
                        "Proxy listing load failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(source) => {
                    return Err(ProxySourceError::UpstreamUnavailable {
                        attempts: retry_count + 1,
                        source,
                    })
                }
            }
        }

        let html = browser.page_source().await?;
        Ok(parse_proxy_list(&html))
    }
}

/// Extract proxy addresses from the listing markup.
pub fn parse_proxy_list(html: &str) -> Vec<ProxyEndpoint> {
    let document = Html::parse_document(html);
    let (Ok(list), Ok(link)) = (Selector::parse(PROXY_LIST_SELECTOR), Selector::parse("a")) else {
        return Vec::new();
    };

    document
        .select(&list)
        .next()
        .map(|ol| {
            ol.select(&link)
                .map(|a| a.text().collect::<String>().trim().to_string())
                .filter(|text| !text.is_empty())
                .map(ProxyEndpoint::new)
                .collect()
        })
        .unwrap_or_default()
}
