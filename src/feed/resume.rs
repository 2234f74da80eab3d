//! Resume-point recovery from the poster's own feed.
//!
//! Every repost starts with `<source timestamp>、<target>は書きました:`, so the
//! newest such marker tells how far the previous runs got. Nothing else is
//! persisted between runs.

use super::parser::JournalFeed;
use crate::config::parse_timestamp;
use chrono::{DateTime, FixedOffset};
use regex::Regex;

/// What a single description says about the resume point.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerScan {
    /// The description does not start with a marker for this target.
    NotMarker,
    /// A marker prefix was found but its timestamp does not parse.
    Unparseable(String),
    At(DateTime<FixedOffset>),
}

/// Recognizes markers for one target account.
#[derive(Debug, Clone)]
pub struct MarkerParser {
    pattern: Regex,
}

impl MarkerParser {
    pub fn new(target_id: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"^\s*(?P<time>.*?)、{}は",
            regex::escape(target_id)
        ))?;
        Ok(Self { pattern })
    }

    pub fn scan(&self, description: &str) -> MarkerScan {
        let Some(time) = self
            .pattern
            .captures(description)
            .and_then(|c| c.name("time"))
        else {
            return MarkerScan::NotMarker;
        };
        match parse_timestamp(time.as_str()) {
            Some(at) => MarkerScan::At(at),
            None => MarkerScan::Unparseable(time.as_str().to_string()),
        }
    }
}

/// Raise `floor` to the first marker in `poster` that is strictly newer.
///
/// The feed is most recent first, so the scan stops at the first marker that
/// beats the floor. Markers with unparseable timestamps are skipped. The result
/// is never earlier than `floor`.
pub fn resolve_resume_point(
    poster: &JournalFeed,
    markers: &MarkerParser,
    floor: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    for entry in &poster.entries {
        match markers.scan(&entry.description) {
            MarkerScan::NotMarker => {}
            MarkerScan::Unparseable(raw) => {
                tracing::debug!(title = %entry.title, raw = %raw, "Skipping marker with unparseable time");
            }
            MarkerScan::At(at) if at > floor => {
                tracing::debug!(title = %entry.title, at = %at, "Resume point raised by marker");
                return at;
            }
            MarkerScan::At(_) => {}
        }
    }
    floor
}
