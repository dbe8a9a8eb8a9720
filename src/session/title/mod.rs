//! Conversation titles: background resolution and split naming.

pub mod resolver;
pub mod suffix;

pub use resolver::{PendingTitle, TITLE_PROMPT_PREFIX, TitleResolver, clean_title};
pub use suffix::{derive_next_title, unique_title};
