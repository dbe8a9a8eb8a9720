//! Token accounting against the model's context budget.

pub mod counter;
pub mod encoding;

pub use counter::{TokenCounter, tokens_per_message};
pub use encoding::{Encoding, PieceTokenizer, Tokenizer};
