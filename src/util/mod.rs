//! Small text helpers shared by reply composition and progress logging.

mod text;

pub use text::truncate_chars;
