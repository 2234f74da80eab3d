use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::parser;

/// One `item` of a journal feed, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub title: String,
    pub link: String,
    /// `dc:date`, always UTC.
    pub published: Option<DateTime<Utc>>,
    pub description: String,
}

/// A parsed journal feed. Entries keep the order the site delivers them in,
/// which is most recent first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalFeed {
    pub entries: Vec<JournalEntry>,
}

pub fn parse_feed(bytes: &[u8]) -> Result<JournalFeed> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            // An RSS 2.0 item without <link> falls back to its guid. RSS 1.0
            // items without <link> never get here: feed-rs drops them.
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_else(|| entry.id.clone());
            let published = entry.published.or(entry.updated);
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            JournalEntry {
                title,
                link,
                published,
                description,
            }
        })
        .collect();

    Ok(JournalFeed { entries })
}
