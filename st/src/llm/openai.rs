//! OpenAI-compatible Chat Completions client
//!
//! Streams a completion as server-sent events and forwards each content delta
//! to the caller's channel. Works with any endpoint that speaks the
//! `/v1/chat/completions` streaming protocol.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, StreamChunk, TokenUsage};
use crate::config::LlmConfig;

/// Maximum number of retries when opening the stream
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Marker ending an OpenAI event stream
const DONE_MARKER: &str = "[DONE]";

/// Whether a failed attempt should be retried
fn should_retry(err: &LlmError, attempt: u32) -> bool {
    attempt < MAX_RETRIES && err.is_retryable()
}

/// OpenAI API client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAIClient {
    /// Create a new client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "from_config: called");
        let api_key = config.get_api_key()?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
        })
    }

    /// Build the streaming request body
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(request.messages.iter().map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content,
            })
        }));

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // o-series and gpt-5 models take max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }

    /// Open the event stream, retrying transient failures with backoff
    async fn open_stream(&self, body: &serde_json::Value) -> Result<Response, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "open_stream: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "open_stream: network error");
                    let err = LlmError::Network(e);
                    if should_retry(&err, attempt) {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let text = response.text().await.unwrap_or_default();
                let err = LlmError::ApiError { status, message: text };
                if should_retry(&err, attempt) {
                    debug!(attempt, status, "open_stream: retryable status");
                    last_error = Some(err);
                    continue;
                }
                debug!(%status, "open_stream: API error");
                return Err(err);
            }

            debug!("open_stream: connected");
            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "stream: called");
        let body = self.build_request_body(&request);
        let response = self.open_stream(&body).await?;
        let _ = chunk_tx.send(StreamChunk::MessageStart).await;

        let mut stream = response.bytes_stream();
        let mut lines = SseLines::default();
        let mut full_content = String::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();
        let mut finished = false;

        'read: while let Some(chunk_result) = stream.next().await {
            if chunk_tx.is_closed() {
                debug!("stream: receiver dropped, stopping");
                break;
            }
            let chunk = chunk_result.map_err(LlmError::Network)?;

            for line in lines.push(&chunk) {
                let Some(event) = parse_sse_line(&line)? else {
                    continue;
                };
                match event {
                    SseEvent::Done => {
                        debug!("stream: received done marker");
                        finished = true;
                        break 'read;
                    }
                    SseEvent::Chunk(data) => {
                        if let Some(choice) = data.choices.first() {
                            if let Some(content) = choice.delta.content.as_deref().filter(|c| !c.is_empty()) {
                                full_content.push_str(content);
                                if chunk_tx.send(StreamChunk::TextDelta(content.to_string())).await.is_err() {
                                    debug!("stream: receiver dropped mid-delta, stopping");
                                    break 'read;
                                }
                            }
                            if let Some(reason) = &choice.finish_reason {
                                stop_reason = StopReason::from_openai(reason);
                            }
                        }
                        // Usage arrives in the last chunk when include_usage is set
                        if let Some(u) = data.usage {
                            usage.input_tokens = u.prompt_tokens;
                            usage.output_tokens = u.completion_tokens;
                        }
                    }
                }
            }
        }

        if !finished {
            debug!("stream: ended without done marker");
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone {
                stop_reason: stop_reason.clone(),
                usage: usage.clone(),
            })
            .await;

        Ok(CompletionResponse {
            content: if full_content.is_empty() { None } else { Some(full_content) },
            stop_reason,
            usage,
        })
    }
}

/// Splits a byte stream into complete lines
///
/// Bytes are held until a newline arrives so a multi-byte character split
/// across network chunks is decoded whole.
#[derive(Debug, Default)]
struct SseLines {
    pending: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }
}

#[derive(Debug)]
enum SseEvent {
    Chunk(OpenAIStreamChunk),
    Done,
}

/// Parse one SSE line; lines other than `data:` are ignored
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == DONE_MARKER {
        return Ok(Some(SseEvent::Done));
    }
    let chunk = serde_json::from_str::<OpenAIStreamChunk>(data).map_err(|e| {
        debug!(error = %e, "parse_sse_line: malformed event");
        LlmError::InvalidResponse(format!("Malformed stream event: {}", e))
    })?;
    Ok(Some(SseEvent::Chunk(chunk)))
}

// OpenAI streaming types

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn client(model: &str, max_tokens: u32) -> OpenAIClient {
        OpenAIClient {
            model: model.to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.openai.com".to_string(),
            http: Client::new(),
            max_tokens,
            temperature: Some(0.7),
        }
    }

    fn request(max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are a planner".to_string(),
            messages: vec![Message::user("Move to Lisbon")],
            max_tokens,
            temperature: None,
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let body = client("gpt-4o-mini", 4096).build_request_body(&request(1000));

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a planner");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Move to Lisbon");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_max_tokens_capped() {
        let body = client("gpt-4o-mini", 1000).build_request_body(&request(5000));
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_completion_tokens_field_for_o_series() {
        let body = client("o3-mini", 4096).build_request_body(&request(100));
        assert_eq!(body["max_completion_tokens"], 100);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_should_retry_follows_error_kind() {
        let unavailable = LlmError::ApiError {
            status: 503,
            message: "Unavailable".to_string(),
        };
        assert!(should_retry(&unavailable, 0));
        assert!(!should_retry(&unavailable, MAX_RETRIES));

        let unauthorized = LlmError::ApiError {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert!(!should_retry(&unauthorized, 0));
        assert!(!should_retry(&LlmError::InvalidResponse("empty".to_string()), 0));
    }

    #[test]
    fn test_parse_sse_line() {
        assert!(parse_sse_line(": keep-alive").unwrap().is_none());
        assert!(matches!(parse_sse_line("data: [DONE]").unwrap(), Some(SseEvent::Done)));

        let line = r#"data: {"choices":[{"delta":{"content":"{\"st"},"finish_reason":null}]}"#;
        match parse_sse_line(line).unwrap() {
            Some(SseEvent::Chunk(chunk)) => {
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("{\"st"));
            }
            other => panic!("Expected chunk, got {:?}", other),
        }

        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn test_parse_usage_only_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#;
        match parse_sse_line(line).unwrap() {
            Some(SseEvent::Chunk(chunk)) => {
                assert!(chunk.choices.is_empty());
                assert_eq!(chunk.usage.unwrap().completion_tokens, 34);
            }
            other => panic!("Expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn test_sse_lines_hold_partial_lines() {
        let mut lines = SseLines::default();
        assert!(lines.push(b"data: {\"a\"").is_empty());
        assert_eq!(lines.push(b":1}\n\ndata: [DO"), vec!["data: {\"a\":1}".to_string()]);
        assert_eq!(lines.push(b"NE]\n"), vec!["data: [DONE]".to_string()]);
    }

    #[test]
    fn test_sse_lines_split_multibyte_char() {
        let text = "data: café\n".as_bytes();
        let split = text.len() - 2;
        let mut lines = SseLines::default();
        assert!(lines.push(&text[..split]).is_empty());
        assert_eq!(lines.push(&text[split..]), vec!["data: café".to_string()]);
    }
}
