//! Error types for the session engine.

use thiserror::Error;

/// Session engine error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing credential or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),
    /// Another process holds the store lock.
    #[error("another process is already running")]
    AlreadyRunning,
    /// No token encoding is known for the model.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    /// The message list cannot fit the model budget, even after a split.
    #[error("context of {tokens} tokens exceeds the budget of {budget}")]
    ContextOverflow {
        /// Estimated token count.
        tokens: usize,
        /// Configured maximum.
        budget: usize,
    },
    /// Transport failure while talking to the completion service.
    #[error("network error: {0}")]
    Network(String),
    /// The completion service answered with an error or an unusable payload.
    #[error("service error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Service {
        /// HTTP status, if the failure came with one.
        status: Option<u16>,
        /// Error detail.
        message: String,
    },
    /// Rename target already in use.
    #[error("title already in use: {0}")]
    Conflict(String),
    /// Titles must contain visible characters.
    #[error("title must not be empty")]
    EmptyTitle,
    /// No stored conversation has this title.
    #[error("no conversation titled {0}")]
    NotFound(String),
    /// Underlying store read/write failure.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// Filesystem error outside of the store itself.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Build a service error without an HTTP status.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the operator can retry after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::AlreadyRunning)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Service {
                status: Some(status.as_u16()),
                message: err.to_string(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for ChatError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("record encoding: {err}"))
    }
}

impl From<url::ParseError> for ChatError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid base url: {err}"))
    }
}

impl From<regex::Error> for ChatError {
    fn from(err: regex::Error) -> Self {
        Self::Config(format!("invalid pattern: {err}"))
    }
}

/// Convenience result alias for session operations.
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_startup_errors_are_unrecoverable() {
        assert!(!ChatError::Config("missing key".to_string()).is_recoverable());
        assert!(!ChatError::AlreadyRunning.is_recoverable());
        assert!(ChatError::Conflict("Chat B".to_string()).is_recoverable());
        assert!(ChatError::Persistence("disk full".to_string()).is_recoverable());
        assert!(ChatError::UnsupportedModel("llama".to_string()).is_recoverable());
    }

    #[test]
    fn test_service_error_display_includes_status() {
        let err = ChatError::Service {
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "service error (429): rate limited");
        assert_eq!(
            ChatError::service("empty body").to_string(),
            "service error: empty body"
        );
    }
}
