//! Completion service seam.

use std::future::Future;
use std::pin::Pin;

use crate::session::core::errors::ChatResult;
use crate::session::core::message::Message;
use crate::session::stream::FragmentStream;

/// Boxed future type for completion service calls.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote chat-completion service.
pub trait CompletionService: Send + Sync {
    /// Request a whole completion and return its content.
    ///
    /// # Errors
    /// Returns a network or service error if the request fails.
    fn complete(&self, messages: Vec<Message>) -> ServiceFuture<'_, ChatResult<String>>;

    /// Start a streamed completion.
    ///
    /// Resolves only once the service has accepted the request, so initiation failures
    /// surface here and never as a half-read stream.
    ///
    /// # Errors
    /// Returns a network or service error if the request is rejected.
    fn stream(&self, messages: Vec<Message>) -> ServiceFuture<'_, ChatResult<FragmentStream>>;
}
