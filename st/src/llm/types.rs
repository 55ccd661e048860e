//! Request and streaming types for chat-completion calls

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything needed for one completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (the planner instructions)
    pub system_prompt: String,

    /// Conversation so far; a revision replays the earlier exchange
    pub messages: Vec<Message>,

    /// Max tokens for the response (capped by config)
    pub max_tokens: u32,

    /// Sampling temperature; None leaves the provider default
    pub temperature: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Final result of a streamed completion
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Full text (if any)
    pub content: Option<String>,

    /// Why the model stopped
    pub stop_reason: StopReason,

    /// Token usage, when the provider reports it
    pub usage: TokenUsage,
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
}

impl StopReason {
    /// Parse an OpenAI `finish_reason`
    pub fn from_openai(s: &str) -> Self {
        debug!(%s, "StopReason::from_openai: called");
        match s {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage for the call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One event on the streaming channel
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Response headers accepted; text will follow
    MessageStart,

    /// Text being generated
    TextDelta(String),

    /// Message complete with final stats
    MessageDone { stop_reason: StopReason, usage: TokenUsage },

    /// Error during streaming
    Error(String),
}
