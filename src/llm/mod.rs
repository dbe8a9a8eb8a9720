//! Completion service access: the service seam and its OpenAI-compatible client.

pub mod openai_client;
pub mod service;

pub use openai_client::OpenAiClient;
pub use service::{CompletionService, ServiceFuture};
