use super::queue::PendingQueue;
use super::session::{PostingSession, SessionError};
use crate::browser::{close, Browser, BrowserError, BrowserLauncher};
use crate::config::Config;
use crate::proxy::ProxyPool;
use crate::snapshot::Snapshots;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Session(#[from] SessionError),
    /// No browser could be started at all; retrying other proxies won't help.
    #[error(transparent)]
    Launch(#[from] BrowserError),
}

/// What a delivery pass achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sessions started.
    pub attempts: usize,
    pub posted: usize,
    /// Items still queued because every proxy failed. A later run picks them up.
    pub remaining: usize,
}

/// Runs posting sessions over the proxy pool until the queue drains.
pub struct FailoverController<'a, L: BrowserLauncher> {
    launcher: &'a L,
    config: &'a Config,
    snapshots: &'a Snapshots,
}

impl<'a, L: BrowserLauncher> FailoverController<'a, L> {
    pub fn new(launcher: &'a L, config: &'a Config, snapshots: &'a Snapshots) -> Self {
        Self {
            launcher,
            config,
            snapshots,
        }
    }

    /// Try each proxy in order with a fresh browser session.
    ///
    /// The queue is shared by every attempt, so an attempt resumes exactly where
    /// the previous one stopped. Running out of proxies is not an error.
    ///
    /// # Errors
    ///
    /// Non-retryable session errors (such as an unknown login page) and
    /// browser launch failures end the delivery immediately.
    pub async fn deliver(
        &self,
        pool: &ProxyPool,
        queue: &mut PendingQueue,
    ) -> Result<DeliveryReport, DeliveryError> {
        let posted_before = queue.confirmed();
        let mut attempts = 0;

        for proxy in pool.iter() {
            if queue.is_empty() {
                break;
            }
            attempts += 1;
            tracing::info!(proxy = %proxy, pending = queue.len(), "Trying proxy");

            let browser = self.launcher.launch(Some(proxy)).await?;
            let result = PostingSession::new(&browser, self.config, self.snapshots)
                .run(queue)
                .await;

            if let Err(e) = &result {
                if e.is_retryable() {
                    tracing::warn!(proxy = %proxy, error = %e, pending = queue.len(), "Session timed out");
                    if self.config.take_timeout_screenshot {
                        if let Ok(title) = browser.title().await {
                            tracing::info!(title = %title, "Page at timeout");
                        }
                        self.snapshots.capture(&browser, "timeout").await;
                    }
                }
            }

            close(&browser, proxy.as_str()).await;

            match result {
                Ok(()) => break,
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let report = DeliveryReport {
            attempts,
            posted: queue.confirmed() - posted_before,
            remaining: queue.len(),
        };
        if report.remaining > 0 {
            tracing::warn!(
                remaining = report.remaining,
                "Proxies exhausted with items still pending; deferring to next run"
            );
        }
        Ok(report)
    }
}
