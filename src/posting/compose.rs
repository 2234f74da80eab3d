//! Text of a repost.

use crate::feed::FeedItem;
use crate::util::truncate_chars;

/// Fixed tag every repost carries, followed by the source account id.
pub const CATEGORY_TAG: &str = "変なモノ";

/// Timestamp layout of the marker line; the resume-point parser reads it back.
/// Fractional seconds are written only when non-zero.
pub const MARKER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub title: String,
    pub body: String,
    pub tags: String,
}

/// Compose the quoted reply for `item`, written by `target_id`.
///
/// The body opens with the marker line `<time>、<target>は書きました:`, then
/// quotes the first `quote_length` characters of the description and links
/// back to the source.
pub fn compose_reply(item: &FeedItem, target_id: &str, quote_length: usize) -> Reply {
    let mut body = format!(
        "{}、{}は書きました:\n",
        item.published_at.format(MARKER_TIME_FORMAT),
        target_id
    );
    body.push_str(&format!(
        "<blockquote>\n{}\n</blockquote>\n",
        truncate_chars(&item.description, quote_length)
    ));
    body.push_str(&format!(
        "<a href=\"{}\">怒らないで続きを読む...</a>",
        item.link
    ));

    Reply {
        title: format!("Re: {}", item.title),
        body,
        tags: format!("{} {} ", CATEGORY_TAG, target_id),
    }
}
