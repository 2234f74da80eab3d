use crate::config::Config;
use crate::feed::parser::{parse_feed, JournalFeed};
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::snapshot::Snapshots;
use futures::StreamExt;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors from a single feed download attempt.
///
/// [`FetchError::is_proxy_failure`] separates failures attributed to the proxy
/// (drop it and try the next) from failures of the feed itself.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (connect, proxy handshake, broken chunked body, ...)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The proxy address could not be turned into a client.
    #[error("Invalid proxy {proxy}: {reason}")]
    InvalidProxy { proxy: String, reason: String },
    /// HTTP response with non-2xx status code. The site was reached.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Feed body was not RSS/RDF (typically a proxy error page)
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// True when the failure is blamed on the proxy rather than the feed.
    pub fn is_proxy_failure(&self) -> bool {
        match self {
            FetchError::Network(e) => !e.is_builder() && !e.is_redirect(),
            FetchError::InvalidProxy { .. }
            | FetchError::Parse(_)
            | FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus(_) | FetchError::ResponseTooLarge => false,
        }
    }
}

/// Result of fetching one feed through the pool.
///
/// The pool is handed back with every failed proxy removed, so later stages
/// start from proxies known to be at least not dead.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched { feed: JournalFeed, pool: ProxyPool },
    /// Every proxy failed at the network level; the pool is now empty.
    Exhausted,
}

/// Downloads journal feeds through the proxy pool.
pub struct FeedFetcher<'a> {
    config: &'a Config,
    snapshots: &'a Snapshots,
}

impl<'a> FeedFetcher<'a> {
    pub fn new(config: &'a Config, snapshots: &'a Snapshots) -> Self {
        Self { config, snapshots }
    }

    /// Fetch `user_id`'s journal feed, trying proxies from the head of `pool`.
    ///
    /// # Errors
    ///
    /// Only feed-level failures are returned as errors:
    /// - [`FetchError::HttpStatus`] - the site answered with a non-2xx status
    /// - [`FetchError::ResponseTooLarge`] - body exceeded 10MB
    ///
    /// Proxy-level failures are absorbed by discarding the proxy. Running out
    /// of proxies is [`FetchOutcome::Exhausted`].
    pub async fn fetch(&self, user_id: &str, mut pool: ProxyPool) -> Result<FetchOutcome, FetchError> {
        let url = self.config.journal_feed_url(user_id);

        while let Some(proxy) = pool.head() {
            tracing::info!(url = %url, proxy = %proxy, "Fetching feed via proxy");

            match self.fetch_via(proxy, &url).await {
                Ok((bytes, feed)) => {
                    tracing::info!(
                        url = %url,
                        proxy = %proxy,
                        entries = feed.entries.len(),
                        "Feed fetched"
                    );
                    self.snapshots.save_feed(user_id, &bytes);
                    return Ok(FetchOutcome::Fetched { feed, pool });
                }
                Err(e) if e.is_proxy_failure() => {
                    tracing::warn!(
                        proxy = %proxy,
                        error = %e,
                        remaining = pool.len() - 1,
                        "Proxy failed, discarding"
                    );
                    pool.discard_head();
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(url = %url, "No working proxy left");
        Ok(FetchOutcome::Exhausted)
    }

    async fn fetch_via(
        &self,
        proxy: &ProxyEndpoint,
        url: &str,
    ) -> Result<(Vec<u8>, JournalFeed), FetchError> {
        let invalid = |reason: String| FetchError::InvalidProxy {
            proxy: proxy.to_string(),
            reason,
        };
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy.url()).map_err(|e| invalid(e.to_string()))?)
            .timeout(self.config.page_load_timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        let feed = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        Ok((bytes, feed))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title><link>http://journal.test/~alice/journal/1</link></item>
</channel></rss>"#;

    /// Port 1 on loopback refuses connections.
    const DEAD_PROXY: &str = "127.0.0.1:1";

    fn test_config() -> Config {
        Config {
            site_url: "http://journal.test".to_string(),
            page_load_timeout: std::time::Duration::from_secs(5),
            ..Config::default()
        }
    }

    /// The mock server plays the proxy: plain-HTTP requests arrive in absolute form.
    fn proxy_of(server: &MockServer) -> ProxyEndpoint {
        ProxyEndpoint::new(server.address().to_string())
    }

    fn pool_of(proxies: &[ProxyEndpoint]) -> ProxyPool {
        ProxyPool::new(proxies.iter().cloned())
    }

    #[tokio::test]
    async fn test_fetch_success_keeps_pool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/~alice/journal/rss"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&server)
            .await;

        let config = test_config();
        let snapshots = Snapshots::disabled();
        let fetcher = FeedFetcher::new(&config, &snapshots);
        let pool = pool_of(&[proxy_of(&server)]);

        match fetcher.fetch("alice", pool.clone()).await.unwrap() {
            FetchOutcome::Fetched { feed, pool: after } => {
                assert_eq!(feed.entries.len(), 1);
                assert_eq!(after, pool);
            }
            FetchOutcome::Exhausted => panic!("expected a feed"),
        }
    }

    #[tokio::test]
    async fn test_dead_first_proxy_is_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;

        let config = test_config();
        let snapshots = Snapshots::disabled();
        let fetcher = FeedFetcher::new(&config, &snapshots);
        let live = proxy_of(&server);
        let pool = pool_of(&[ProxyEndpoint::new(DEAD_PROXY), live.clone()]);

        match fetcher.fetch("alice", pool).await.unwrap() {
            FetchOutcome::Fetched { pool, .. } => {
                assert_eq!(pool.len(), 1);
                assert_eq!(pool.head(), Some(&live));
            }
            FetchOutcome::Exhausted => panic!("second proxy should have worked"),
        }
    }

    #[tokio::test]
    async fn test_all_proxies_dead_is_exhausted() {
        let config = test_config();
        let snapshots = Snapshots::disabled();
        let fetcher = FeedFetcher::new(&config, &snapshots);
        let pool = pool_of(&[ProxyEndpoint::new(DEAD_PROXY), ProxyEndpoint::new(DEAD_PROXY)]);

        let outcome = fetcher.fetch("alice", pool).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Exhausted));
    }

    #[tokio::test]
    async fn test_http_status_fails_without_trying_next_proxy() {
        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&failing)
            .await;

        let untouched = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(0)
            .mount(&untouched)
            .await;

        let config = test_config();
        let snapshots = Snapshots::disabled();
        let fetcher = FeedFetcher::new(&config, &snapshots);
        let pool = pool_of(&[proxy_of(&failing), proxy_of(&untouched)]);

        match fetcher.fetch("alice", pool).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_discards_proxy() {
        let garbage = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .mount(&garbage)
            .await;

        let config = test_config();
        let snapshots = Snapshots::disabled();
        let fetcher = FeedFetcher::new(&config, &snapshots);
        let pool = pool_of(&[proxy_of(&garbage)]);

        let outcome = fetcher.fetch("alice", pool).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Exhausted));
    }

    #[tokio::test]
    async fn test_saves_feed_dump_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join("journal_relay_fetch_dump");
        std::fs::create_dir_all(&dir).unwrap();
        let config = Config {
            save_feed: true,
            snapshot_dir: dir.clone(),
            ..test_config()
        };
        let snapshots = Snapshots::new(&config);
        let fetcher = FeedFetcher::new(&config, &snapshots);

        fetcher
            .fetch("alice", pool_of(&[proxy_of(&server)]))
            .await
            .unwrap();

        let dumps: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with("-rss-alice.xml"))
            .collect();
        assert_eq!(dumps.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_status_error_is_not_proxy_failure() {
        assert!(!FetchError::HttpStatus(500).is_proxy_failure());
        assert!(!FetchError::ResponseTooLarge.is_proxy_failure());
        assert!(FetchError::Parse("x".into()).is_proxy_failure());
        assert!(FetchError::IncompleteResponse {
            expected: 10,
            received: 3
        }
        .is_proxy_failure());
    }
}
