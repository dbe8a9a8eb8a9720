//! Model encodings used by the token counter.
//!
//! The exact BPE tables live outside this crate; [`Tokenizer`] is the seam. The bundled
//! [`PieceTokenizer`] splits text with the cl100k pre-tokenization pattern and charges each
//! piece by its byte length, which tracks the real encodings closely enough for budget
//! decisions while staying deterministic.

use regex::Regex;

use crate::session::core::errors::{ChatError, ChatResult};

/// Encoded-length service for model encodings.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` encodes to under `model`'s encoding.
    ///
    /// # Errors
    /// Returns [`ChatError::UnsupportedModel`] if no encoding is known for `model`.
    fn encoded_len(&self, text: &str, model: &str) -> ChatResult<usize>;
}

/// Encoding families recognised by [`PieceTokenizer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// `gpt-3.5-turbo`, `gpt-4`, and their dated variants.
    Cl100kBase,
    /// `gpt-4o`, `gpt-4.1`, and the `o`-series reasoning models.
    O200kBase,
}

impl Encoding {
    /// Resolve the encoding for a model name.
    #[must_use]
    pub fn for_model(model: &str) -> Option<Self> {
        const O200K_PREFIXES: [&str; 5] = ["gpt-4o", "gpt-4.1", "o1", "o3", "o4"];
        const CL100K_PREFIXES: [&str; 3] = ["gpt-3.5-turbo", "gpt-35-turbo", "gpt-4"];

        if O200K_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
            return Some(Self::O200kBase);
        }
        if CL100K_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
            return Some(Self::Cl100kBase);
        }
        None
    }

    /// Bytes a single token covers before a piece is charged extra.
    const fn bytes_per_token(self) -> usize {
        match self {
            Self::Cl100kBase => 4,
            Self::O200kBase => 5,
        }
    }
}

/// Approximating tokenizer over the cl100k pre-tokenization pattern.
pub struct PieceTokenizer {
    pieces: Regex,
}

impl PieceTokenizer {
    /// Build the tokenizer.
    ///
    /// # Errors
    /// Returns an error if the piece pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let pieces = Regex::new(
            r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+",
        )?;
        Ok(Self { pieces })
    }

    fn count(&self, text: &str, encoding: Encoding) -> usize {
        let per_token = encoding.bytes_per_token();
        self.pieces
            .find_iter(text)
            .map(|piece| piece.as_str().len().div_ceil(per_token).max(1))
            .sum()
    }
}

impl Tokenizer for PieceTokenizer {
    fn encoded_len(&self, text: &str, model: &str) -> ChatResult<usize> {
        let encoding = Encoding::for_model(model)
            .ok_or_else(|| ChatError::UnsupportedModel(model.to_string()))?;
        Ok(self.count(text, encoding))
    }
}
