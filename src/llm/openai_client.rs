//! Client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Behaviour:
//! - Every request carries the bearer credential and the configured model.
//! - Non-streaming calls return `choices[0].message.content`.
//! - Streaming calls check the response status before handing the body to the consumer,
//!   so a rejected request never yields a stream.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::service::{CompletionService, ServiceFuture};
use crate::session::core::config::ServiceConfig;
use crate::session::core::errors::{ChatError, ChatResult};
use crate::session::core::message::Message;
use crate::session::stream::{FragmentStream, consume};

/// Path appended to the configured base URL.
const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Async client for the completion service.
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Create a client from service settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ServiceConfig) -> ChatResult<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}{COMPLETIONS_PATH}",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn post(&self, messages: &[Message], stream: bool) -> ChatResult<Response> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            stream,
        };

        debug!(
            "POST {} ({} messages, stream={stream})",
            self.endpoint,
            messages.len()
        );
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map_or_else(|_| body.trim().to_string(), |envelope| envelope.error.message);
            return Err(ChatError::Service {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(response)
    }
}

impl CompletionService for OpenAiClient {
    fn complete(&self, messages: Vec<Message>) -> ServiceFuture<'_, ChatResult<String>> {
        Box::pin(async move {
            let response = self.post(&messages, false).await?;
            let body = response.text().await?;
            let parsed: CompletionResponse = serde_json::from_str(&body)
                .map_err(|err| ChatError::service(format!("malformed completion: {err}")))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| ChatError::service("completion has no content"))
        })
    }

    fn stream(&self, messages: Vec<Message>) -> ServiceFuture<'_, ChatResult<FragmentStream>> {
        Box::pin(async move {
            let response = self.post(&messages, true).await?;
            Ok(consume(response.bytes_stream()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        let config = ServiceConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1/", server.uri()),
            ..ServiceConfig::default()
        };
        OpenAiClient::new(&config).ok().unwrap_or_else(|| unreachable!())
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "stream": false,
                "messages": [{"role": "user", "content": "suggest me a short title for Hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "\"Greeting\""}}]
            })))
            .mount(&server)
            .await;

        let content = client_for(&server)
            .complete(vec![Message::user("suggest me a short title for Hello")])
            .await;
        assert_eq!(content.ok().as_deref(), Some("\"Greeting\""));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .stream(vec![Message::user("Hello")])
            .await
            .ok()
            .unwrap_or_else(|| unreachable!());
        let fragments: Vec<String> = stream.filter_map(|item| async move { item.ok() }).collect().await;
        assert_eq!(fragments, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn test_rejected_stream_fails_before_reading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).stream(vec![Message::user("Hello")]).await;
        assert!(matches!(
            result,
            Err(ChatError::Service {
                status: Some(401),
                ref message,
            }) if message == "Incorrect API key provided"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let config = ServiceConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            ..ServiceConfig::default()
        };
        let client = OpenAiClient::new(&config).ok().unwrap_or_else(|| unreachable!());
        let result = client.complete(vec![Message::user("Hello")]).await;
        assert!(matches!(result, Err(ChatError::Network(_))));
    }
}
