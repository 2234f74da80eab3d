use super::parser::JournalFeed;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;

/// A target entry selected for reposting.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// Publish time in the configured local zone.
    pub published_at: DateTime<FixedOffset>,
    pub description: String,
}

/// Pick the entries of `target` strictly newer than `resume_point`.
///
/// The feed is most recent first, so collection stops at the first entry that
/// is not newer. With `max_count > 0` only the newest `max_count` are kept.
/// The result is oldest first, the order the reposts are made in.
pub fn select_items(
    target: &JournalFeed,
    resume_point: DateTime<FixedOffset>,
    max_count: usize,
    zone: Tz,
) -> Vec<FeedItem> {
    let mut items = Vec::new();

    for entry in &target.entries {
        let Some(published) = entry.published else {
            tracing::warn!(title = %entry.title, link = %entry.link, "Entry has no date, skipping");
            continue;
        };
        let local = published.with_timezone(&zone).fixed_offset();
        if local <= resume_point {
            break;
        }
        items.push(FeedItem {
            title: entry.title.clone(),
            link: entry.link.clone(),
            published_at: local,
            description: entry.description.clone(),
        });
    }

    if max_count > 0 && items.len() > max_count {
        tracing::info!(found = items.len(), limit = max_count, "Limiting target items");
        items.truncate(max_count);
    }

    items.reverse();
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_timestamp;
    use crate::feed::parser::JournalEntry;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn resume() -> DateTime<FixedOffset> {
        parse_timestamp("2024-03-01 00:00:00+09:00").unwrap()
    }

    /// Entries `hours` after the resume point, in the order given.
    fn feed(hours: &[i64]) -> JournalFeed {
        JournalFeed {
            entries: hours
                .iter()
                .map(|h| JournalEntry {
                    title: format!("T{h:+}"),
                    link: format!("https://srad.jp/~alice/journal/{h}"),
                    published: Some((resume() + Duration::hours(*h)).with_timezone(&Utc)),
                    description: format!("body {h}"),
                })
                .collect(),
        }
    }

    fn titles(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_selects_newer_oldest_first() {
        let items = select_items(&feed(&[3, 2, 1, 0, -1]), resume(), 0, chrono_tz::Asia::Tokyo);
        assert_eq!(titles(&items), vec!["T+1", "T+2", "T+3"]);
    }

    #[test]
    fn test_converts_to_local_zone() {
        let items = select_items(&feed(&[1]), resume(), 0, chrono_tz::Asia::Tokyo);
        assert_eq!(
            items[0].published_at.format("%Y-%m-%d %H:%M:%S%:z").to_string(),
            "2024-03-01 01:00:00+09:00"
        );
    }

    #[test]
    fn test_stops_at_first_old_entry() {
        // Out-of-order feed: the newer entry after the old one is not reached.
        let items = select_items(&feed(&[2, -1, 5]), resume(), 0, chrono_tz::Asia::Tokyo);
        assert_eq!(titles(&items), vec!["T+2"]);
    }

    #[test]
    fn test_equal_to_resume_point_is_excluded() {
        let items = select_items(&feed(&[0]), resume(), 0, chrono_tz::Asia::Tokyo);
        assert!(items.is_empty());
    }

    #[test]
    fn test_max_count_keeps_newest() {
        let items = select_items(&feed(&[5, 4, 3, 2, 1]), resume(), 3, chrono_tz::Asia::Tokyo);
        assert_eq!(titles(&items), vec!["T+3", "T+4", "T+5"]);
    }

    #[test]
    fn test_max_post_two_skips_oldest() {
        // T-3, T-2, T-1 relative to "now", all newer than the resume point.
        let items = select_items(&feed(&[9, 8, 7]), resume(), 2, chrono_tz::Asia::Tokyo);
        assert_eq!(titles(&items), vec!["T+8", "T+9"]);
    }

    #[test]
    fn test_undated_entry_is_skipped() {
        let mut target = feed(&[2, 1]);
        target.entries.insert(
            1,
            JournalEntry {
                title: "undated".into(),
                link: "https://srad.jp/~alice/journal/x".into(),
                published: None,
                description: String::new(),
            },
        );
        let items = select_items(&target, resume(), 0, chrono_tz::Asia::Tokyo);
        assert_eq!(titles(&items), vec!["T+1", "T+2"]);
    }

    proptest! {
        #[test]
        fn prop_sorted_and_newer(mut hours in prop::collection::vec(-48i64..48, 0..20), max in 0usize..6) {
            hours.sort_unstable_by(|a, b| b.cmp(a));
            let items = select_items(&feed(&hours), resume(), max, chrono_tz::Asia::Tokyo);

            prop_assert!(items.iter().all(|i| i.published_at > resume()));
            prop_assert!(items.windows(2).all(|w| w[0].published_at <= w[1].published_at));
            if max > 0 {
                prop_assert!(items.len() <= max);
            }
            let newer = hours.iter().filter(|h| **h > 0).count();
            let expected = if max > 0 { newer.min(max) } else { newer };
            prop_assert_eq!(items.len(), expected);
        }
    }
}
