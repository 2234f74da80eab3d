//! Screenshots, raw feed dumps, and their retention.
//!
//! Everything here is an observability side effect: failures are logged and
//! never change the outcome of a run.

use crate::browser::Browser;
use crate::config::Config;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// `2024-03-01-19-00-00-123456`
fn stamp() -> String {
    Local::now().format("%Y-%m-%d-%H-%M-%S-%6f").to_string()
}

/// Writes snapshot files under the configured directory.
#[derive(Debug, Clone)]
pub struct Snapshots {
    dir: PathBuf,
    screenshots: bool,
    feeds: bool,
}

impl Snapshots {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.snapshot_dir.clone(),
            screenshots: config.take_screenshot,
            feeds: config.save_feed,
        }
    }

    /// Writes nothing.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::from("."),
            screenshots: false,
            feeds: false,
        }
    }

    pub fn path_for(&self, tag: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.{}", stamp(), tag, extension))
    }

    /// Checkpoint screenshot, taken only when screenshots are enabled.
    pub async fn screenshot<B: Browser + ?Sized>(&self, browser: &B, tag: &str) {
        if self.screenshots {
            self.capture(browser, tag).await;
        }
    }

    /// Screenshot regardless of the checkpoint setting (timeout diagnostics).
    pub async fn capture<B: Browser + ?Sized>(&self, browser: &B, tag: &str) {
        let path = self.path_for(tag, "png");
        match browser.screenshot_png().await {
            Ok(png) => self.write(&path, &png),
            Err(e) => tracing::warn!(tag = %tag, error = %e, "Failed to take screenshot"),
        }
    }

    pub fn save_feed(&self, user_id: &str, bytes: &[u8]) {
        if self.feeds {
            let path = self.path_for(&format!("rss-{user_id}"), "xml");
            self.write(&path, bytes);
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) {
        match std::fs::write(path, bytes) {
            Ok(()) => tracing::debug!(path = %path.display(), "Snapshot written"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write snapshot")
            }
        }
    }
}

/// Delete writable regular files in `dir` last modified more than `retention` ago.
///
/// Read-only files are kept, so a snapshot can be pinned with `chmod -w`.
/// Returns the number of files removed.
pub fn prune(dir: &Path, retention: Duration) -> usize {
    let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
        return 0;
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot read snapshot directory");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() || meta.permissions().readonly() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Expired snapshot removed");
                removed += 1;
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove snapshot"),
        }
    }
    removed
}
