//! Token-budget estimation for message lists.

use std::sync::Arc;

use crate::session::core::errors::ChatResult;
use crate::session::core::message::Message;
use crate::session::tokens::encoding::Tokenizer;

/// Tokens added once per request for the assistant reply primer.
const REPLY_PRIMER_TOKENS: usize = 3;

/// Estimates the prompt cost of a message list.
#[derive(Clone)]
pub struct TokenCounter {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenCounter {
    /// Create a counter over the given tokenizer.
    #[must_use]
    pub const fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Estimate the token cost of `messages` for `model`.
    ///
    /// Each message costs a fixed overhead plus the encoded length of its content and role;
    /// the total carries a fixed reply primer.
    ///
    /// # Errors
    /// Returns [`crate::session::ChatError::UnsupportedModel`] if the model has no encoding.
    pub fn estimate(&self, messages: &[Message], model: &str) -> ChatResult<usize> {
        let per_message = tokens_per_message(model);
        let mut total = 0_usize;
        for message in messages {
            total += per_message;
            total += self.tokenizer.encoded_len(&message.content, model)?;
            total += self.tokenizer.encoded_len(message.role.as_str(), model)?;
        }
        // An empty list still has to resolve the model.
        if messages.is_empty() {
            self.tokenizer.encoded_len("", model)?;
        }
        Ok(total + REPLY_PRIMER_TOKENS)
    }
}

/// Fixed framing cost per message.
#[must_use]
pub fn tokens_per_message(model: &str) -> usize {
    if model.starts_with("gpt-3.5-turbo") || model.starts_with("gpt-35-turbo") {
        4
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::core::errors::ChatError;
    use crate::session::tokens::encoding::PieceTokenizer;

    /// Charges one token per character so totals are easy to check by hand.
    struct CharTokenizer;

    impl Tokenizer for CharTokenizer {
        fn encoded_len(&self, text: &str, model: &str) -> ChatResult<usize> {
            if model == "unknown" {
                return Err(ChatError::UnsupportedModel(model.to_string()));
            }
            Ok(text.chars().count())
        }
    }

    fn char_counter() -> TokenCounter {
        TokenCounter::new(Arc::new(CharTokenizer))
    }

    fn piece_counter() -> TokenCounter {
        let tokenizer = PieceTokenizer::new().ok().unwrap_or_else(|| unreachable!());
        TokenCounter::new(Arc::new(tokenizer))
    }

    #[test]
    fn test_estimate_formula() {
        let messages = vec![Message::system("abc"), Message::user("hello")];
        // (4 + 3 + 6) + (4 + 5 + 4) + 3
        assert_eq!(char_counter().estimate(&messages, "gpt-3.5-turbo").ok(), Some(29));
        // (3 + 3 + 6) + (3 + 5 + 4) + 3
        assert_eq!(char_counter().estimate(&messages, "gpt-4").ok(), Some(27));
    }

    #[test]
    fn test_unknown_model_fails() {
        let messages = vec![Message::user("hello")];
        assert!(matches!(
            char_counter().estimate(&messages, "unknown"),
            Err(ChatError::UnsupportedModel(_))
        ));
        assert!(char_counter().estimate(&[], "unknown").is_err());
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let counter = piece_counter();
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Explain lifetimes in Rust, with an example."),
            Message::assistant("A lifetime names the scope a reference is valid for."),
        ];
        let first = counter.estimate(&messages, "gpt-3.5-turbo").ok();
        for _ in 0..5 {
            assert_eq!(counter.estimate(&messages, "gpt-3.5-turbo").ok(), first);
        }
    }

    #[test]
    fn test_estimate_is_monotone_in_appends() {
        let counter = piece_counter();
        let mut messages = Vec::new();
        let mut previous = counter.estimate(&messages, "gpt-3.5-turbo").unwrap_or_default();
        for content in ["", "Hello", "Hi there!", "How do I read a file?", "Use std::fs::read_to_string."] {
            messages.push(Message::user(content));
            let next = counter.estimate(&messages, "gpt-3.5-turbo").unwrap_or_default();
            assert!(next >= previous, "{next} < {previous}");
            previous = next;
        }
    }
}
