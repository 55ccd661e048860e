//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless streaming client; every call is an independent conversation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Stream a completion
    ///
    /// Text deltas are sent to `chunk_tx` as they arrive, followed by a
    /// `MessageDone`. Streaming stops early once the receiver is dropped.
    /// Returns the final complete response.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::llm::{StopReason, TokenUsage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock client that streams canned text in fixed pieces
    pub struct MockLlmClient {
        chunks: Vec<String>,
        fail_after: Option<usize>,
        call_count: AtomicUsize,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(chunks: Vec<&str>) -> Self {
            debug!(chunk_count = %chunks.len(), "MockLlmClient::new: called");
            Self {
                chunks: chunks.into_iter().map(String::from).collect(),
                fail_after: None,
                call_count: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        /// Send `n` chunks and then fail with a network-style error
        pub fn failing_after(mut self, n: usize) -> Self {
            self.fail_after = Some(n);
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<CompletionRequest> {
            self.last_request.lock().ok().and_then(|r| r.clone())
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn stream(
            &self,
            request: CompletionRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::stream: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_request.lock() {
                *last = Some(request);
            }

            let _ = chunk_tx.send(StreamChunk::MessageStart).await;
            let mut content = String::new();
            for (i, chunk) in self.chunks.iter().enumerate() {
                if self.fail_after == Some(i) {
                    return Err(LlmError::InvalidResponse("connection reset".to_string()));
                }
                if chunk_tx.send(StreamChunk::TextDelta(chunk.clone())).await.is_err() {
                    break;
                }
                content.push_str(chunk);
            }

            let usage = TokenUsage::default();
            let _ = chunk_tx
                .send(StreamChunk::MessageDone {
                    stop_reason: StopReason::EndTurn,
                    usage: usage.clone(),
                })
                .await;

            Ok(CompletionResponse {
                content: Some(content),
                stop_reason: StopReason::EndTurn,
                usage,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn request() -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![],
                max_tokens: 1000,
                temperature: None,
            }
        }

        #[tokio::test]
        async fn test_mock_client_streams_chunks() {
            let client = MockLlmClient::new(vec!["{\"st", "eps\":[]}"]);
            let (tx, mut rx) = mpsc::channel(16);

            let response = client.stream(request(), tx).await.unwrap();
            assert_eq!(response.content.as_deref(), Some("{\"steps\":[]}"));
            assert_eq!(client.call_count(), 1);

            let mut text = String::new();
            while let Some(chunk) = rx.recv().await {
                if let StreamChunk::TextDelta(t) = chunk {
                    text.push_str(&t);
                }
            }
            assert_eq!(text, "{\"steps\":[]}");
        }

        #[tokio::test]
        async fn test_mock_client_fails_after() {
            let client = MockLlmClient::new(vec!["a", "b", "c"]).failing_after(2);
            let (tx, _rx) = mpsc::channel(16);
            assert!(client.stream(request(), tx).await.is_err());
        }
    }
}
