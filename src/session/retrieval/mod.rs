//! Title retrieval.

pub mod search_index;

pub use search_index::SearchIndex;
