use std::borrow::Cow;

/// Keep at most `max_chars` characters of `s`.
///
/// Counts Unicode scalar values, not bytes, so Japanese text is cut at a
/// character boundary. Returns `Cow::Borrowed` when nothing is cut.
///
/// # Examples
///
/// ```
/// use journal_relay::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Hello World", 5), "Hello");
/// assert_eq!(truncate_chars("こんにちは世界", 5), "こんにちは");
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_end, _)) => Cow::Owned(s[..byte_end].to_string()),
        None => Cow::Borrowed(s),
    }
}
