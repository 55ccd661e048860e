//! LLM error types

use thiserror::Error;

/// Errors that can occur while talking to the model
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),
}

impl LlmError {
    /// Check if retrying the request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ApiError { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) | LlmError::MissingApiKey(_) => false,
        }
    }
}
