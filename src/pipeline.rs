//! One complete run: proxies, feeds, resume point, selection, delivery.

use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::feed::{
    resolve_resume_point, select_items, FeedFetcher, FetchError, FetchOutcome, JournalFeed,
    MarkerParser,
};
use crate::posting::{DeliveryError, FailoverController, PendingQueue};
use crate::proxy::{ProxyPool, ProxySource, ProxySourceError, RetryPolicy};
use crate::snapshot::{self, Snapshots};
use crate::util::truncate_chars;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    ProxySource(#[from] ProxySourceError),
    #[error("No working proxy left while fetching {0}'s feed")]
    NoWorkingProxy(String),
    #[error("Failed to fetch {user}'s feed: {source}")]
    Feed {
        user: String,
        #[source]
        source: FetchError,
    },
    #[error("Cannot build marker pattern: {0}")]
    Marker(#[from] regex::Error),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Proxies left in the pool after the feed fetches.
    pub proxies: usize,
    pub resume_point: DateTime<FixedOffset>,
    pub selected: usize,
    pub posted: usize,
    /// Selected items not posted this run.
    pub remaining: usize,
}

pub struct Pipeline<'a, L: BrowserLauncher> {
    config: &'a Config,
    launcher: &'a L,
    proxy_retry: RetryPolicy,
}

impl<'a, L: BrowserLauncher> Pipeline<'a, L> {
    pub fn new(config: &'a Config, launcher: &'a L) -> Self {
        Self {
            config,
            launcher,
            proxy_retry: RetryPolicy::default(),
        }
    }

    pub fn with_proxy_retry(mut self, retry: RetryPolicy) -> Self {
        self.proxy_retry = retry;
        self
    }

    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let config = self.config;
        let snapshots = Snapshots::new(config);

        if let Some(retention) = config.snapshot_retention {
            let removed = snapshot::prune(&config.snapshot_dir, retention);
            tracing::info!(removed = removed, "Pruned expired snapshots");
        }

        tracing::info!(url = %config.proxy_list_url, "Fetching proxy list");
        let pool = ProxySource::new(self.launcher, &config.proxy_list_url)
            .with_retry(self.proxy_retry)
            .fetch()
            .await?;
        tracing::info!(proxies = pool.len(), "Proxy pool ready");

        let fetcher = FeedFetcher::new(config, &snapshots);

        let (poster_feed, pool) = fetch_feed(&fetcher, &config.user_id, pool).await?;
        let markers = MarkerParser::new(&config.target_id)?;
        let resume_point = resolve_resume_point(&poster_feed, &markers, config.time_after);
        tracing::info!(
            resume_point = %resume_point,
            "Target items after the resume point will be reposted"
        );

        let (target_feed, pool) = fetch_feed(&fetcher, &config.target_id, pool).await?;
        let items = select_items(
            &target_feed,
            resume_point,
            config.max_post,
            config.local_time_zone,
        );

        let mut summary = RunSummary {
            proxies: pool.len(),
            resume_point,
            selected: items.len(),
            posted: 0,
            remaining: 0,
        };
        if items.is_empty() {
            tracing::info!("No new target items; nothing to do");
            return Ok(summary);
        }

        let mut queue = PendingQueue::new(items);
        log_pending(&queue);

        let report = FailoverController::new(self.launcher, config, &snapshots)
            .deliver(&pool, &mut queue)
            .await?;

        summary.posted = report.posted;
        summary.remaining = report.remaining;
        tracing::info!(
            posted = summary.posted,
            remaining = summary.remaining,
            attempts = report.attempts,
            dry_run = config.dry_run,
            "Run complete"
        );
        Ok(summary)
    }
}

/// Run once with the default proxy listing retry schedule.
pub async fn run<L: BrowserLauncher>(config: &Config, launcher: &L) -> Result<RunSummary, RunError> {
    Pipeline::new(config, launcher).run().await
}

async fn fetch_feed(
    fetcher: &FeedFetcher<'_>,
    user: &str,
    pool: ProxyPool,
) -> Result<(JournalFeed, ProxyPool), RunError> {
    tracing::info!(user = %user, "Fetching journal feed");
    let outcome = fetcher
        .fetch(user, pool)
        .await
        .map_err(|source| RunError::Feed {
            user: user.to_string(),
            source,
        })?;
    match outcome {
        FetchOutcome::Fetched { feed, pool } => Ok((feed, pool)),
        FetchOutcome::Exhausted => Err(RunError::NoWorkingProxy(user.to_string())),
    }
}

fn log_pending(queue: &PendingQueue) {
    for (i, item) in queue.iter().enumerate() {
        tracing::info!(
            n = i,
            title = %item.title,
            link = %item.link,
            time = %item.published_at.format("%Y/%m/%d %H:%M:%S"),
            description = %truncate_chars(&item.description, 30),
            "Target item"
        );
    }
}
