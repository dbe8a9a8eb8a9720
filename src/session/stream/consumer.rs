//! Streaming completion consumer.
//!
//! Turns a chunked `text/event-stream` body into an ordered stream of content fragments:
//! - blank lines and non-JSON payloads (keep-alives, comments) are skipped;
//! - `data: [DONE]` ends the stream normally, as does end of input;
//! - a read error ends the stream with that error, after the fragments already yielded.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::session::core::errors::{ChatError, ChatResult};
use crate::session::stream::lines::LineBuffer;

/// Marker prefixing every data line.
pub const DATA_MARKER: &str = "data:";
/// Payload that terminates the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Ordered content fragments of one streamed completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ChatResult<String>> + Send>>;

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

/// Classification of a single body line.
#[derive(Debug, PartialEq, Eq)]
enum LineEvent {
    Fragment(String),
    Done,
    Failed(String),
    Skip,
}

fn classify(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    let payload = line
        .strip_prefix(DATA_MARKER)
        .map_or(line, str::trim_start);
    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(StreamChunk {
            error: Some(error), ..
        }) => LineEvent::Failed(error.message),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map_or(LineEvent::Skip, LineEvent::Fragment),
        Err(err) => {
            debug!("Skipping non-JSON stream line: {err}");
            LineEvent::Skip
        }
    }
}

struct ConsumerState<S> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    ready: VecDeque<ChatResult<String>>,
    finished: bool,
}

impl<S> ConsumerState<S> {
    /// Queue the outcome of each line; returns `false` once the stream is over.
    fn absorb(&mut self, lines: Vec<String>) -> bool {
        for line in lines {
            match classify(&line) {
                LineEvent::Fragment(fragment) => self.ready.push_back(Ok(fragment)),
                LineEvent::Skip => {}
                LineEvent::Done => return false,
                LineEvent::Failed(message) => {
                    self.ready.push_back(Err(ChatError::service(message)));
                    return false;
                }
            }
        }
        true
    }
}

/// Consume a chunked completion body into content fragments.
pub fn consume<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = ConsumerState {
        body: Box::pin(body),
        lines: LineBuffer::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.lines.push(chunk.as_ref());
                    state.finished = !state.absorb(lines);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(ChatError::Network(format!("stream read: {err}"))), state));
                }
                None => {
                    let tail = state.lines.finish().into_iter().collect();
                    state.absorb(tail);
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}, "index": 0}]})
        )
    }

    async fn collect(mut stream: FragmentStream) -> (Vec<String>, Option<ChatError>) {
        let mut fragments = Vec::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => fragments.push(fragment),
                Err(err) => {
                    assert!(error.is_none(), "more than one error yielded");
                    error = Some(err);
                }
            }
        }
        (fragments, error)
    }

    fn chunks(parts: Vec<String>) -> FragmentStream {
        consume(stream::iter(
            parts.into_iter().map(Ok::<_, std::io::Error>),
        ))
    }

    #[tokio::test]
    async fn test_fragments_in_emission_order() {
        let body = vec![delta("Hi"), delta(" there"), delta("!"), "data: [DONE]\n\n".to_string()];
        let (fragments, error) = collect(chunks(body)).await;
        assert_eq!(fragments, vec!["Hi", " there", "!"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let whole = format!("{}{}data: [DONE]\n", delta("Hel"), delta("lo"));
        let parts: Vec<String> = whole
            .as_bytes()
            .chunks(7)
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect();
        let (fragments, error) = collect(chunks(parts)).await;
        assert_eq!(fragments.concat(), "Hello");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let body = vec![
            ": keep-alive\n".to_string(),
            delta("a"),
            "data: {not json\n".to_string(),
            "event: ping\n".to_string(),
            delta("b"),
        ];
        let (fragments, error) = collect(chunks(body)).await;
        assert_eq!(fragments, vec!["a", "b"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_role_only_delta_is_skipped() {
        let body = vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n".to_string(),
            delta("x"),
        ];
        let (fragments, _) = collect(chunks(body)).await;
        assert_eq!(fragments, vec!["x"]);
    }

    #[tokio::test]
    async fn test_nothing_after_done_sentinel() {
        let body = vec![format!("{}data: [DONE]\n{}", delta("a"), delta("late"))];
        let (fragments, error) = collect(chunks(body)).await;
        assert_eq!(fragments, vec!["a"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_processed() {
        let body = vec![delta("a"), delta("b").trim_end().to_string()];
        let (fragments, _) = collect(chunks(body)).await;
        assert_eq!(fragments, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_read_error_after_n_fragments() {
        let items: Vec<Result<String, std::io::Error>> = vec![
            Ok(delta("one")),
            Ok(delta("two")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(delta("never")),
        ];
        let (fragments, error) = collect(consume(stream::iter(items))).await;
        assert_eq!(fragments, vec!["one", "two"]);
        assert!(matches!(error, Some(ChatError::Network(message)) if message.contains("reset")));
    }

    #[tokio::test]
    async fn test_error_payload_ends_stream() {
        let body = vec![
            delta("partial"),
            "data: {\"error\":{\"message\":\"overloaded\"}}\n".to_string(),
            delta("never"),
        ];
        let (fragments, error) = collect(chunks(body)).await;
        assert_eq!(fragments, vec!["partial"]);
        assert!(matches!(error, Some(ChatError::Service { message, .. }) if message == "overloaded"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), LineEvent::Skip);
        assert_eq!(classify("data: [DONE]"), LineEvent::Done);
        assert_eq!(classify("data:[DONE]"), LineEvent::Done);
        assert_eq!(
            classify("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}"),
            LineEvent::Fragment("Hi".to_string())
        );
        assert_eq!(classify("data: garbage"), LineEvent::Skip);
    }
}
