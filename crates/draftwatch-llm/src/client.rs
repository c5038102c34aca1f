// Claude Messages API streaming client.
//
// Requests are sent with `stream: true`; the Server-Sent Events are folded
// by `StreamAccumulator` into `LlmEvent`s and forwarded over an mpsc
// channel. Every event carries the generation of the request that produced
// it so receivers can drop output from superseded requests.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmEvent {
    Token {
        text: String,
        generation: u64,
    },
    Complete {
        full_text: String,
        input_tokens: u32,
        output_tokens: u32,
        generation: u64,
    },
    Error {
        message: String,
        generation: u64,
    },
}

impl LlmEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LlmEvent::Token { generation, .. }
            | LlmEvent::Complete { generation, .. }
            | LlmEvent::Error { generation, .. } => *generation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LlmEvent::Token { .. })
    }
}

// ---------------------------------------------------------------------------
// Stream accumulator
// ---------------------------------------------------------------------------

/// What to do with one SSE message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamStep {
    Forward(LlmEvent),
    Finish(LlmEvent),
    Continue,
}

/// Folds SSE messages for one request into events.
#[derive(Debug)]
pub(crate) struct StreamAccumulator {
    generation: u64,
    text: String,
    input_tokens: u32,
    output_tokens: u32,
}

impl StreamAccumulator {
    pub(crate) fn new(generation: u64) -> Self {
        StreamAccumulator {
            generation,
            text: String::new(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub(crate) fn on_message(&mut self, event_type: &str, data: &str) -> StreamStep {
        match event_type {
            "message_start" => {
                match parse_input_tokens(data) {
                    Some(n) => self.input_tokens = n,
                    None => warn!("message_start without input_tokens"),
                }
                StreamStep::Continue
            }
            "content_block_delta" => match parse_delta_text(data) {
                Some(text) if !text.is_empty() => {
                    self.text.push_str(&text);
                    StreamStep::Forward(LlmEvent::Token {
                        text,
                        generation: self.generation,
                    })
                }
                _ => StreamStep::Continue,
            },
            "message_delta" => {
                if let Some(n) = parse_output_tokens(data) {
                    self.output_tokens = n;
                }
                StreamStep::Continue
            }
            "message_stop" => StreamStep::Finish(self.complete()),
            "error" => StreamStep::Finish(LlmEvent::Error {
                message: parse_error_message(data)
                    .unwrap_or_else(|| "API reported an error".to_string()),
                generation: self.generation,
            }),
            other => {
                debug!(event_type = other, "ignoring SSE event");
                StreamStep::Continue
            }
        }
    }

    fn complete(&mut self) -> LlmEvent {
        LlmEvent::Complete {
            full_text: std::mem::take(&mut self.text),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            generation: self.generation,
        }
    }

    /// Event for a stream that ended without `message_stop`.
    pub(crate) fn end_of_stream(mut self) -> LlmEvent {
        if self.text.is_empty() {
            LlmEvent::Error {
                message: "stream ended without any content".to_string(),
                generation: self.generation,
            }
        } else {
            self.complete()
        }
    }
}

// ---------------------------------------------------------------------------
// ClaudeClient
// ---------------------------------------------------------------------------

pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        ClaudeClient {
            http: reqwest::Client::new(),
            api_key,
            model,
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stream one completion over `tx`. Returns once a terminal event has
    /// been sent or the receiver is gone.
    pub async fn stream_message(
        &self,
        system: &str,
        user_content: &str,
        max_tokens: u32,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "stream": true,
            "system": system,
            "messages": [{ "role": "user", "content": user_content }]
        });

        let request = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = match request.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: format!("failed to open event stream: {e}"),
                        generation,
                    })
                    .await;
                return Ok(());
            }
        };

        let mut acc = StreamAccumulator::new(generation);
        while let Some(event) = es.next().await {
            let step = match event {
                Ok(Event::Open) => {
                    debug!(generation, "SSE connection opened");
                    StreamStep::Continue
                }
                Ok(Event::Message(msg)) => acc.on_message(&msg.event, &msg.data),
                Err(err) => {
                    warn!(?err, generation, "SSE stream error");
                    StreamStep::Finish(LlmEvent::Error {
                        message: describe_stream_error(&err),
                        generation,
                    })
                }
            };

            match step {
                StreamStep::Continue => {}
                StreamStep::Forward(event) => {
                    if tx.send(event).await.is_err() {
                        es.close();
                        return Ok(());
                    }
                }
                StreamStep::Finish(event) => {
                    es.close();
                    let _ = tx.send(event).await;
                    return Ok(());
                }
            }
        }

        let _ = tx.send(acc.end_of_stream()).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// Either a configured Claude client or nothing. Disabled clients answer
/// every request with an `Error` event.
pub enum LlmClient {
    Active(ClaudeClient),
    Disabled,
}

impl LlmClient {
    /// Active when `api_key` is present and non-blank.
    pub fn from_key(api_key: Option<&str>, model: &str) -> Self {
        match api_key.map(str::trim) {
            Some(key) if !key.is_empty() => {
                LlmClient::Active(ClaudeClient::new(key.to_string(), model.to_string()))
            }
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }

    pub async fn stream_message(
        &self,
        system: &str,
        user_content: &str,
        max_tokens: u32,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        match self {
            LlmClient::Active(client) => {
                client
                    .stream_message(system, user_content, max_tokens, tx, generation)
                    .await
            }
            LlmClient::Disabled => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: "LLM not configured".to_string(),
                        generation,
                    })
                    .await;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON helpers
// ---------------------------------------------------------------------------

/// `{ "message": { "usage": { "input_tokens": N } } }`
fn parse_input_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    let n = v.get("message")?.get("usage")?.get("input_tokens")?.as_u64()?;
    u32::try_from(n).ok()
}

/// `{ "delta": { "type": "text_delta", "text": "..." } }`
fn parse_delta_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?.get("text")?.as_str().map(str::to_string)
}

/// `{ "usage": { "output_tokens": N } }`
fn parse_output_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    let n = v.get("usage")?.get("output_tokens")?.as_u64()?;
    u32::try_from(n).ok()
}

/// `{ "type": "error", "error": { "type": "overloaded_error", "message": "..." } }`
fn parse_error_message(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?.get("message")?.as_str().map(str::to_string)
}

fn describe_stream_error(err: &reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => {
            format!("API returned status {status}")
        }
        reqwest_eventsource::Error::Transport(e) => format!("network error: {e}"),
        other => format!("stream error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_tokens_from_message_start() {
        let data = r#"{
            "type": "message_start",
            "message": { "id": "msg_1", "usage": { "input_tokens": 42, "output_tokens": 0 } }
        }"#;
        assert_eq!(parse_input_tokens(data), Some(42));
        assert_eq!(parse_input_tokens(r#"{ "message": {} }"#), None);
        assert_eq!(parse_input_tokens("not json"), None);
    }

    #[test]
    fn delta_text_extracted() {
        let data = r#"{ "type": "content_block_delta", "index": 0,
                        "delta": { "type": "text_delta", "text": "Take Bijan" } }"#;
        assert_eq!(parse_delta_text(data), Some("Take Bijan".to_string()));
        assert_eq!(parse_delta_text(r#"{ "index": 0 }"#), None);
    }

    #[test]
    fn error_payload_message() {
        let data = r#"{ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } }"#;
        assert_eq!(parse_error_message(data), Some("Overloaded".to_string()));
    }

    #[test]
    fn accumulator_full_stream() {
        let mut acc = StreamAccumulator::new(7);
        assert_eq!(
            acc.on_message("message_start", r#"{"message":{"usage":{"input_tokens":120}}}"#),
            StreamStep::Continue
        );
        assert_eq!(
            acc.on_message("content_block_delta", r#"{"delta":{"text":"Draft "}}"#),
            StreamStep::Forward(LlmEvent::Token {
                text: "Draft ".into(),
                generation: 7
            })
        );
        acc.on_message("ping", "{}");
        acc.on_message("content_block_delta", r#"{"delta":{"text":"Lamar."}}"#);
        acc.on_message("message_delta", r#"{"usage":{"output_tokens":9}}"#);

        assert_eq!(
            acc.on_message("message_stop", "{}"),
            StreamStep::Finish(LlmEvent::Complete {
                full_text: "Draft Lamar.".into(),
                input_tokens: 120,
                output_tokens: 9,
                generation: 7
            })
        );
    }

    #[test]
    fn empty_delta_not_forwarded() {
        let mut acc = StreamAccumulator::new(1);
        assert_eq!(
            acc.on_message("content_block_delta", r#"{"delta":{"text":""}}"#),
            StreamStep::Continue
        );
    }

    #[test]
    fn error_event_finishes_stream() {
        let mut acc = StreamAccumulator::new(3);
        let step = acc.on_message("error", r#"{"error":{"message":"Overloaded"}}"#);
        assert_eq!(
            step,
            StreamStep::Finish(LlmEvent::Error {
                message: "Overloaded".into(),
                generation: 3
            })
        );
    }

    #[test]
    fn truncated_stream_outcomes() {
        let empty = StreamAccumulator::new(2).end_of_stream();
        assert!(matches!(empty, LlmEvent::Error { generation: 2, .. }));

        let mut partial = StreamAccumulator::new(2);
        partial.on_message("content_block_delta", r#"{"delta":{"text":"Half"}}"#);
        assert!(matches!(
            partial.end_of_stream(),
            LlmEvent::Complete { ref full_text, .. } if full_text == "Half"
        ));
    }

    #[test]
    fn client_from_key() {
        assert!(LlmClient::from_key(Some("sk-test"), "claude-sonnet-4-5").is_active());
        assert!(!LlmClient::from_key(Some("  "), "claude-sonnet-4-5").is_active());
        assert!(!LlmClient::from_key(None, "claude-sonnet-4-5").is_active());
    }

    #[tokio::test]
    async fn disabled_client_reports_error() {
        let (tx, mut rx) = mpsc::channel(4);
        LlmClient::Disabled
            .stream_message("sys", "user", 100, tx, 5)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation(), 5);
        assert!(event.is_terminal());
    }
}
