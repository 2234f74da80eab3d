use crate::feed::FeedItem;
use std::collections::VecDeque;

/// Items waiting to be reposted, oldest first.
///
/// The head is removed only by [`PendingQueue::confirm_head`], after the site
/// confirmed the post. A failed attempt leaves the head in place for the next
/// session, so what remains after a run is always a suffix of what was queued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
    items: VecDeque<FeedItem>,
    confirmed: usize,
}

impl PendingQueue {
    pub fn new(items: Vec<FeedItem>) -> Self {
        Self {
            items: items.into(),
            confirmed: 0,
        }
    }

    pub fn head(&self) -> Option<&FeedItem> {
        self.items.front()
    }

    /// Dequeue the head after its post was confirmed.
    pub fn confirm_head(&mut self) -> Option<FeedItem> {
        let item = self.items.pop_front()?;
        self.confirmed += 1;
        Some(item)
    }

    /// Posts confirmed so far in this run, across all sessions.
    pub fn confirmed(&self) -> usize {
        self.confirmed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_timestamp;

    fn item(title: &str) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            link: format!("https://srad.jp/~alice/journal/{title}"),
            published_at: parse_timestamp("2024-03-01 00:00:00+09:00").unwrap(),
            description: String::new(),
        }
    }

    #[test]
    fn test_confirm_head_advances_in_order() {
        let mut queue = PendingQueue::new(vec![item("a"), item("b")]);
        assert_eq!(queue.head().unwrap().title, "a");

        assert_eq!(queue.confirm_head().unwrap().title, "a");
        assert_eq!(queue.confirmed(), 1);
        assert_eq!(queue.head().unwrap().title, "b");

        assert_eq!(queue.confirm_head().unwrap().title, "b");
        assert!(queue.is_empty());
        assert!(queue.confirm_head().is_none());
        assert_eq!(queue.confirmed(), 2);
    }
}
