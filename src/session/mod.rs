//! Conversation session and history engine.
//!
//! Token budgeting, streamed replies, background title resolution, conversation splitting,
//! an exclusive local history store, and fuzzy title search.

pub mod core;
pub mod engine;
pub mod retrieval;
pub mod storage;
pub mod stream;
pub mod title;
pub mod tokens;

pub use core::{ChatConfig, ChatError, ChatResult, Conversation, Message, Role};
pub use engine::{SessionBackends, SessionController, SessionEvent, SessionState, SubmitOutcome};
pub use storage::{HistoryStore, StoreLock};
