//! Core types: configuration, errors, and message records.

pub mod config;
pub mod errors;
pub mod message;

pub use config::{BudgetConfig, ChatConfig, ServiceConfig, StorageConfig};
pub use errors::{ChatError, ChatResult};
pub use message::{Conversation, Message, Role, render_transcript, strip_system};
