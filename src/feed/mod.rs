//! Journal feed acquisition and interpretation.
//!
//! - [`parser`] turns RSS/RDF bytes into [`JournalEntry`] values using `feed-rs`
//! - [`fetcher`] downloads a journal feed through the proxy pool, discarding
//!   proxies that fail at the network level
//! - [`resume`] recovers the resume point from markers in the poster's own feed
//! - [`select`] picks the target entries newer than the resume point, oldest first

mod fetcher;
mod parser;
mod resume;
mod select;

pub use fetcher::{FeedFetcher, FetchError, FetchOutcome};
pub use parser::{parse_feed, JournalEntry, JournalFeed};
pub use resume::{resolve_resume_point, MarkerParser, MarkerScan};
pub use select::{select_items, FeedItem};
