//! Conversation history with an in-memory mirror of the persistent store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::session::core::errors::{ChatError, ChatResult};
use crate::session::core::message::Conversation;
use crate::session::storage::sqlite_store::ConversationStore;

/// Title-keyed history: every write goes to the backend first and reaches the mirror
/// only once the backend has committed it.
pub struct HistoryStore {
    backend: Arc<dyn ConversationStore>,
    mirror: HashMap<String, Conversation>,
}

impl HistoryStore {
    /// Load the full history from `backend`.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    pub async fn load(backend: Arc<dyn ConversationStore>) -> ChatResult<Self> {
        let mut store = Self {
            backend,
            mirror: HashMap::new(),
        };
        store.refresh().await?;
        info!("Loaded {} conversations", store.mirror.len());
        Ok(store)
    }

    /// Re-read the mirror from the backend, e.g. after a persistence fault.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read; the mirror is then left as it was.
    pub async fn refresh(&mut self) -> ChatResult<()> {
        let records = self.backend.list_by_time().await?;
        self.mirror = records.into_iter().collect();
        Ok(())
    }

    /// Insert or replace the conversation under `title`.
    ///
    /// # Errors
    /// Returns a persistence error if the write fails; the mirror is then unchanged.
    pub async fn upsert(&mut self, title: &str, conversation: Conversation) -> ChatResult<()> {
        self.backend
            .put(title.to_string(), conversation.clone())
            .await?;
        self.mirror.insert(title.to_string(), conversation);
        debug!("Saved conversation {title:?}");
        Ok(())
    }

    /// Remove the conversation under `title`. Absent titles are not an error.
    ///
    /// # Errors
    /// Returns a persistence error if the delete fails; the mirror is then unchanged.
    pub async fn delete(&mut self, title: &str) -> ChatResult<()> {
        self.backend.remove(title.to_string()).await?;
        self.mirror.remove(title);
        debug!("Deleted conversation {title:?}");
        Ok(())
    }

    /// Move a conversation to a new title, all or nothing.
    ///
    /// # Errors
    /// Returns [`ChatError::Conflict`] if `new_title` is used by another conversation,
    /// [`ChatError::NotFound`] if `old_title` does not exist, or a persistence error.
    pub async fn rename(&mut self, old_title: &str, new_title: &str) -> ChatResult<()> {
        if old_title == new_title {
            return if self.mirror.contains_key(old_title) {
                Ok(())
            } else {
                Err(ChatError::NotFound(old_title.to_string()))
            };
        }
        if self.mirror.contains_key(new_title) {
            return Err(ChatError::Conflict(new_title.to_string()));
        }

        self.backend
            .rename(old_title.to_string(), new_title.to_string())
            .await?;
        if let Some(conversation) = self.mirror.remove(old_title) {
            self.mirror.insert(new_title.to_string(), conversation);
        }
        debug!("Renamed conversation {old_title:?} to {new_title:?}");
        Ok(())
    }

    /// Conversation stored under `title`.
    #[must_use]
    pub fn get(&self, title: &str) -> Option<&Conversation> {
        self.mirror.get(title)
    }

    /// Whether `title` is in use.
    #[must_use]
    pub fn contains(&self, title: &str) -> bool {
        self.mirror.contains_key(title)
    }

    /// Number of stored conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    /// All conversations, most recent first; equal times are ordered by title.
    #[must_use]
    pub fn list_descending_by_time(&self) -> Vec<(&str, &Conversation)> {
        let mut entries: Vec<(&str, &Conversation)> = self
            .mirror
            .iter()
            .map(|(title, conversation)| (title.as_str(), conversation))
            .collect();
        entries.sort_by(|(a_title, a), (b_title, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a_title.cmp(b_title))
        });
        entries
    }

    /// Titles, most recent first.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.list_descending_by_time()
            .into_iter()
            .map(|(title, _)| title.to_string())
            .collect()
    }
}
