//! Conversation persistence: SQLite records, the in-memory mirror, and the store lock.

pub mod history_store;
pub mod lock;
pub mod sqlite_store;

pub use history_store::HistoryStore;
pub use lock::StoreLock;
pub use sqlite_store::{ConversationStore, SqliteConversationStore, StoreFuture};
