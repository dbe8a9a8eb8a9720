//! Background title resolution for brand-new conversations.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::llm::service::CompletionService;
use crate::session::core::errors::{ChatError, ChatResult};
use crate::session::core::message::Message;

/// Prompt prefix for the title side request.
pub const TITLE_PROMPT_PREFIX: &str = "suggest me a short title for ";

/// Characters of the seed kept when the service returns an empty title.
const FALLBACK_TITLE_CHARS: usize = 40;

/// Issues one title request per brand-new conversation.
#[derive(Clone)]
pub struct TitleResolver {
    service: Arc<dyn CompletionService>,
}

impl TitleResolver {
    /// Create a resolver over the completion service.
    #[must_use]
    pub const fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }

    /// Start resolving a title for `seed` on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn request_title(&self, seed: &str) -> PendingTitle {
        let (tx, rx) = oneshot::channel();
        let service = Arc::clone(&self.service);
        let seed = seed.to_string();

        tokio::spawn(async move {
            let prompt = Message::user(format!("{TITLE_PROMPT_PREFIX}{seed}"));
            let result = service
                .complete(vec![prompt])
                .await
                .map(|raw| clean_title(&raw, &seed));
            if let Err(err) = &result {
                warn!("Title request failed: {err}");
            }
            if tx.send(result).is_err() {
                debug!("Title result abandoned");
            }
        });

        PendingTitle { rx }
    }
}

/// Outstanding title request. Dropping it abandons the result.
#[derive(Debug)]
pub struct PendingTitle {
    rx: oneshot::Receiver<ChatResult<String>>,
}

impl PendingTitle {
    /// Wait for the title.
    ///
    /// # Errors
    /// Returns the request's error, or a service error if the task died without answering.
    pub async fn wait(self) -> ChatResult<String> {
        self.rx
            .await
            .map_err(|_| ChatError::service("title task ended without a result"))?
    }
}

/// Normalise a raw title response: first line, whitespace and quotes trimmed.
///
/// Falls back to the start of `seed` when nothing is left.
#[must_use]
pub fn clean_title(raw: &str, seed: &str) -> String {
    let title = raw
        .trim()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"')
        .trim();
    if !title.is_empty() {
        return title.to_string();
    }

    let fallback: String = seed.trim().chars().take(FALLBACK_TITLE_CHARS).collect();
    fallback.trim_end().to_string()
}
