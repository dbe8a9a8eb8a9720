//! Message and conversation records.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions prepended to every request; never persisted.
    System,
    /// Operator input.
    User,
    /// Model output.
    Assistant,
}

impl Role {
    /// Stable string form used on the wire and on disk.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// A single role-tagged message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl Message {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Persisted conversation record, stored under its title.
///
/// Serialized as `{"time": <unix seconds>, "messages": [...]}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unix seconds of the last successful exchange; drives list order.
    #[serde(rename = "time")]
    pub created_at: i64,
    /// Chronological messages, without any system message.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Build a record stamped with the current time, dropping a leading system message.
    #[must_use]
    pub fn from_exchange(messages: &[Message]) -> Self {
        Self {
            created_at: Utc::now().timestamp(),
            messages: strip_system(messages).to_vec(),
        }
    }
}

/// Slice of `messages` without the leading system message, if any.
#[must_use]
pub fn strip_system(messages: &[Message]) -> &[Message] {
    match messages.first() {
        Some(first) if first.role == Role::System => &messages[1..],
        _ => messages,
    }
}

/// Format messages as `You:` / `Assistant:` blocks for display.
#[must_use]
pub fn render_transcript(messages: &[Message]) -> String {
    strip_system(messages)
        .iter()
        .map(|message| match message.role {
            Role::User => format!("You:\n{}", message.content),
            Role::Assistant => format!("Assistant:\n{}", message.content),
            Role::System => message.content.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_schema_uses_time_key() {
        let record = Conversation {
            created_at: 1_700_000_000,
            messages: vec![Message::user("Hello"), Message::assistant("Hi there")],
        };
        let json = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({
                "time": 1_700_000_000,
                "messages": [
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi there"}
                ]
            })
        );
    }

    #[test]
    fn test_from_exchange_drops_system_message() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("Hello"),
            Message::assistant("Hi"),
        ];
        let record = Conversation::from_exchange(&messages);
        assert_eq!(record.messages, messages[1..].to_vec());
        assert!(record.created_at > 0);
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_render_transcript() {
        let messages = vec![
            Message::system("hidden"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ];
        assert_eq!(
            render_transcript(&messages),
            "You:\nHello\n\nAssistant:\nHi there"
        );
    }
}
