//! Controller states and the events it reports to the presentation layer.

use std::fmt;

/// Exchange lifecycle of the session controller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionState {
    /// No conversation selected.
    #[default]
    Idle,
    /// Waiting for the next submission.
    Composing,
    /// Request built, stream not yet accepted.
    Dispatching,
    /// Fragments are arriving.
    Streaming,
    /// Waiting for the title and writing the record.
    Committing,
}

impl SessionState {
    /// Whether a submission may start in this state.
    #[must_use]
    pub const fn accepts_input(self) -> bool {
        matches!(self, Self::Idle | Self::Composing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Composing => "composing",
            Self::Dispatching => "dispatching",
            Self::Streaming => "streaming",
            Self::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Notifications for the presentation layer, in the order they happen.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    /// The controller moved to a new state.
    StateChanged(SessionState),
    /// The visible transcript must be cleared: new chat, opened chat, or a committed split.
    TranscriptCleared,
    /// A user message was accepted for sending.
    UserMessage(String),
    /// One streamed content fragment.
    Fragment(String),
    /// The exchange was saved under this title.
    Committed {
        /// Title the record was written under.
        title: String,
    },
    /// The exchange was aborted.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_resting_states_accept_input() {
        assert!(SessionState::Idle.accepts_input());
        assert!(SessionState::Composing.accepts_input());
        assert!(!SessionState::Dispatching.accepts_input());
        assert!(!SessionState::Streaming.accepts_input());
        assert!(!SessionState::Committing.accepts_input());
        assert_eq!(SessionState::Streaming.to_string(), "streaming");
    }
}
