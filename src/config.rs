//! Run configuration merged from one or more JSON sources.
//!
//! Each source is a path to a JSON object, or `-` for standard input. Sources are
//! applied in order, so later keys override earlier ones. Every key must be a known
//! option: a typo fails the run before any network activity.
use chrono::{DateTime, Duration as TimeDelta, FixedOffset, Utc};
use chrono_tz::Tz;
use secrecy::SecretString;
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config source '{source_name}': {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    /// Malformed JSON, a wrong type, or an unknown key.
    #[error("Invalid config source '{source_name}': {error}")]
    Parse {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("Missing required configuration key '{0}'")]
    Missing(&'static str),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Directory {0} does not exist")]
    MissingDirectory(PathBuf),
}

// ============================================================================
// Raw Layer
// ============================================================================

/// One JSON source as written by the user. Absent keys leave the value from
/// earlier layers (or the default) in place; `null` does the same.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub page_load_timeout: Option<f64>,
    pub render_timeout: Option<f64>,
    pub webdriver_url: Option<String>,
    pub chrome_browser_path: Option<String>,
    pub target_id: Option<String>,
    pub take_screenshot: Option<bool>,
    pub take_timeout_screenshot: Option<bool>,
    pub save_feed: Option<bool>,
    pub snapshot_dir: Option<String>,
    pub snapshot_retention: Option<String>,
    pub login_temporarily: Option<bool>,
    pub local_time_zone: Option<String>,
    pub time_after: Option<String>,
    pub quote_length: Option<usize>,
    pub dry_run: Option<bool>,
    pub max_post: Option<usize>,
    pub post_interval: Option<f64>,
    pub site_url: Option<String>,
    pub proxy_list_url: Option<String>,
    pub lock_file: Option<String>,
}

macro_rules! overlay {
    ($base:ident, $top:ident, $($field:ident),+ $(,)?) => {
        $( if $top.$field.is_some() { $base.$field = $top.$field; } )+
    };
}

impl ConfigLayer {
    /// Parse a single JSON source.
    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> Result<Self, ConfigError> {
        serde_json::from_reader(reader).map_err(|error| ConfigError::Parse {
            source_name: source_name.to_string(),
            error,
        })
    }

    /// Read a source by name: a file path, or `-` for standard input.
    pub fn read_source(source: &str) -> Result<Self, ConfigError> {
        if source == "-" {
            return Self::from_reader(std::io::stdin().lock(), "<stdin>");
        }
        let file = std::fs::File::open(source).map_err(|error| ConfigError::Io {
            source_name: source.to_string(),
            error,
        })?;
        Self::from_reader(std::io::BufReader::new(file), source)
    }

    /// Apply `top` over `self`, key by key.
    pub fn merge(mut self, top: ConfigLayer) -> Self {
        overlay!(
            self,
            top,
            user_id,
            password,
            page_load_timeout,
            render_timeout,
            webdriver_url,
            chrome_browser_path,
            target_id,
            take_screenshot,
            take_timeout_screenshot,
            save_feed,
            snapshot_dir,
            snapshot_retention,
            login_temporarily,
            local_time_zone,
            time_after,
            quote_length,
            dry_run,
            max_post,
            post_interval,
            site_url,
            proxy_list_url,
            lock_file,
        );
        self
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_TIME_AFTER: &str = "2018-02-01 00:00:00+09:00";

/// Validated, immutable configuration for one run.
///
/// Built once at startup and passed by reference to every component.
/// The password is held as a [`SecretString`] and masked in `Debug`.
#[derive(Clone)]
pub struct Config {
    /// Account that publishes the reposts.
    pub user_id: String,
    pub password: SecretString,
    /// Bound for navigations and feed HTTP requests.
    pub page_load_timeout: Duration,
    /// Bound for in-page condition waits.
    pub render_timeout: Duration,
    /// WebDriver server (chromedriver) endpoint.
    pub webdriver_url: String,
    /// Browser binary handed to the driver; `None` uses the driver default.
    pub chrome_browser_path: Option<PathBuf>,
    /// Account whose journal is mirrored.
    pub target_id: String,
    pub take_screenshot: bool,
    pub take_timeout_screenshot: bool,
    /// Dump every fetched feed document under `snapshot_dir`.
    pub save_feed: bool,
    pub snapshot_dir: PathBuf,
    /// Files in `snapshot_dir` older than this are deleted at startup.
    pub snapshot_retention: Option<Duration>,
    pub login_temporarily: bool,
    pub local_time_zone: Tz,
    /// Resume-point floor: target items at or before this are never reposted.
    pub time_after: DateTime<FixedOffset>,
    /// Number of characters of the source description quoted in a repost.
    pub quote_length: usize,
    pub dry_run: bool,
    /// Maximum reposts per run; 0 means unlimited.
    pub max_post: usize,
    /// Minimum wait between successive confirmed posts.
    pub post_interval: Duration,
    pub site_url: String,
    pub proxy_list_url: String,
    pub lock_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            password: SecretString::from(String::new()),
            page_load_timeout: Duration::from_secs(60),
            render_timeout: Duration::from_secs(120),
            webdriver_url: "http://localhost:9515".to_string(),
            chrome_browser_path: Some(PathBuf::from("/usr/bin/chromium-browser")),
            target_id: "anonymous coward".to_string(),
            take_screenshot: false,
            take_timeout_screenshot: false,
            save_feed: false,
            snapshot_dir: PathBuf::from("."),
            snapshot_retention: None,
            login_temporarily: false,
            local_time_zone: chrono_tz::Asia::Tokyo,
            time_after: parse_timestamp(DEFAULT_TIME_AFTER).unwrap_or_default(),
            quote_length: 50,
            dry_run: false,
            max_post: 5,
            post_interval: Duration::ZERO,
            site_url: "https://srad.jp".to_string(),
            proxy_list_url: "http://www.cybersyndrome.net/pla6.html".to_string(),
            lock_file: std::env::temp_dir().join("journal-relay.lock"),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("user_id", &self.user_id)
            .field("password", &"[REDACTED]")
            .field("page_load_timeout", &self.page_load_timeout)
            .field("render_timeout", &self.render_timeout)
            .field("webdriver_url", &self.webdriver_url)
            .field("chrome_browser_path", &self.chrome_browser_path)
            .field("target_id", &self.target_id)
            .field("take_screenshot", &self.take_screenshot)
            .field("take_timeout_screenshot", &self.take_timeout_screenshot)
            .field("save_feed", &self.save_feed)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("snapshot_retention", &self.snapshot_retention)
            .field("login_temporarily", &self.login_temporarily)
            .field("local_time_zone", &self.local_time_zone)
            .field("time_after", &self.time_after)
            .field("quote_length", &self.quote_length)
            .field("dry_run", &self.dry_run)
            .field("max_post", &self.max_post)
            .field("post_interval", &self.post_interval)
            .field("site_url", &self.site_url)
            .field("proxy_list_url", &self.proxy_list_url)
            .field("lock_file", &self.lock_file)
            .finish()
    }
}

impl Config {
    /// Read and merge every source in order, then validate.
    pub fn load<S: AsRef<str>>(sources: &[S]) -> Result<Self, ConfigError> {
        let mut merged = ConfigLayer::default();
        for source in sources {
            merged = merged.merge(ConfigLayer::read_source(source.as_ref())?);
        }
        Self::from_layer(merged, Utc::now())
    }

    /// Validate a merged layer. `now` anchors relative `time_after` values.
    pub fn from_layer(layer: ConfigLayer, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let user_id = layer
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("user_id"))?;
        let password = layer
            .password
            .filter(|p| !p.is_empty())
            .map(SecretString::from)
            .ok_or(ConfigError::Missing("password"))?;

        let local_time_zone = match layer.local_time_zone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "local_time_zone",
                    reason: e.to_string(),
                })?,
            None => defaults.local_time_zone,
        };

        let time_after = parse_time_after(
            layer.time_after.as_deref().unwrap_or(DEFAULT_TIME_AFTER),
            now,
            local_time_zone,
        )?;

        let snapshot_dir = match layer.snapshot_dir.as_deref() {
            None | Some("") => std::env::current_dir().map_err(|error| ConfigError::Io {
                source_name: "current directory".to_string(),
                error,
            })?,
            Some(dir) => PathBuf::from(dir),
        };
        if !snapshot_dir.is_dir() {
            return Err(ConfigError::MissingDirectory(snapshot_dir));
        }

        let snapshot_retention = match layer.snapshot_retention.as_deref() {
            None | Some("") => None,
            Some(value) => Some(
                parse_relative(value)
                    .and_then(|d| d.to_std().map_err(|e| e.to_string()))
                    .map_err(|reason| ConfigError::InvalidValue {
                        key: "snapshot_retention",
                        reason,
                    })?,
            ),
        };

        let chrome_browser_path = match layer.chrome_browser_path {
            Some(path) if path.is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => defaults.chrome_browser_path,
        };

        let site_url = layer.site_url.unwrap_or(defaults.site_url);
        url::Url::parse(&site_url).map_err(|e| ConfigError::InvalidValue {
            key: "site_url",
            reason: e.to_string(),
        })?;

        Ok(Self {
            user_id,
            password,
            page_load_timeout: seconds("page_load_timeout", layer.page_load_timeout)?
                .unwrap_or(defaults.page_load_timeout),
            render_timeout: seconds("render_timeout", layer.render_timeout)?
                .unwrap_or(defaults.render_timeout),
            webdriver_url: layer.webdriver_url.unwrap_or(defaults.webdriver_url),
            chrome_browser_path,
            target_id: layer.target_id.unwrap_or(defaults.target_id),
            take_screenshot: layer.take_screenshot.unwrap_or(defaults.take_screenshot),
            take_timeout_screenshot: layer
                .take_timeout_screenshot
                .unwrap_or(defaults.take_timeout_screenshot),
            save_feed: layer.save_feed.unwrap_or(defaults.save_feed),
            snapshot_dir,
            snapshot_retention,
            login_temporarily: layer.login_temporarily.unwrap_or(defaults.login_temporarily),
            local_time_zone,
            time_after,
            quote_length: layer.quote_length.unwrap_or(defaults.quote_length),
            dry_run: layer.dry_run.unwrap_or(defaults.dry_run),
            max_post: layer.max_post.unwrap_or(defaults.max_post),
            post_interval: seconds("post_interval", layer.post_interval)?
                .unwrap_or(defaults.post_interval),
            site_url: site_url.trim_end_matches('/').to_string(),
            proxy_list_url: layer.proxy_list_url.unwrap_or(defaults.proxy_list_url),
            lock_file: layer
                .lock_file
                .map(PathBuf::from)
                .unwrap_or(defaults.lock_file),
        })
    }

    /// `<site>/~<user>/journal/rss`
    pub fn journal_feed_url(&self, user: &str) -> String {
        format!("{}/~{}/journal/rss", self.site_url, user)
    }

    pub fn login_url(&self) -> String {
        format!("{}/my/login", self.site_url)
    }

    pub fn composer_url(&self) -> String {
        format!("{}/journal?new", self.site_url)
    }
}

fn seconds(key: &'static str, value: Option<f64>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
}

// ============================================================================
// Time Parsing
// ============================================================================

/// Parse `time_after`: an absolute timestamp, or a relative `field=value,...`
/// duration meaning "that long before `now`", expressed in `zone`.
pub fn parse_time_after(
    value: &str,
    now: DateTime<Utc>,
    zone: Tz,
) -> Result<DateTime<FixedOffset>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: "time_after",
        reason,
    };

    if value.contains('=') {
        let delta = parse_relative(value).map_err(invalid)?;
        let instant = now
            .checked_sub_signed(delta)
            .ok_or_else(|| invalid(format!("'{value}' reaches before the representable range")))?;
        return Ok(instant.with_timezone(&zone).fixed_offset());
    }

    parse_timestamp(value).ok_or_else(|| invalid(format!("'{value}' is not a timestamp")))
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.ffffff]±HH:MM` and RFC 3339.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z"))
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

/// Parse `days=3,hours=12` style durations.
pub fn parse_relative(value: &str) -> Result<TimeDelta, String> {
    let mut total = TimeDelta::zero();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (field, amount) = part
            .split_once('=')
            .ok_or_else(|| format!("expected field=value, got '{part}'"))?;
        let amount: i64 = amount
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not an integer", amount.trim()))?;
        let delta = match field.trim() {
            "weeks" => TimeDelta::try_weeks(amount),
            "days" => TimeDelta::try_days(amount),
            "hours" => TimeDelta::try_hours(amount),
            "minutes" => TimeDelta::try_minutes(amount),
            "seconds" => TimeDelta::try_seconds(amount),
            other => return Err(format!("unknown duration field '{other}'")),
        }
        .ok_or_else(|| format!("'{part}' is out of range"))?;
        total = total
            .checked_add(&delta)
            .ok_or_else(|| format!("'{value}' is out of range"))?;
    }
    Ok(total)
}

// ============================================================================
// Tests
// ============================================================================
