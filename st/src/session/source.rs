//! Sources of streamed text chunks

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::llm::StreamChunk;

/// Failure reported by the transport mid-stream
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// An ordered stream of UTF-8 text chunks
///
/// `None` means the stream completed normally. After [`ChunkSource::close`]
/// the source must not produce further chunks.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Option<Result<String, TransportError>>;

    /// Release the underlying stream
    async fn close(&mut self);
}

/// Adapts the LLM client's streaming channel
pub struct ChannelSource {
    rx: mpsc::Receiver<StreamChunk>,
    producer: Option<JoinHandle<()>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<StreamChunk>) -> Self {
        Self { rx, producer: None }
    }

    /// Attach the task feeding the channel so closing also stops it
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.rx.recv().await? {
                StreamChunk::TextDelta(text) => return Some(Ok(text)),
                StreamChunk::Error(message) => return Some(Err(TransportError(message))),
                StreamChunk::MessageDone { stop_reason, usage } => {
                    debug!(?stop_reason, ?usage, "ChannelSource::next_chunk: message done");
                    return None;
                }
                StreamChunk::MessageStart => {
                    debug!("ChannelSource::next_chunk: message started");
                }
            }
        }
    }

    async fn close(&mut self) {
        debug!("ChannelSource::close: called");
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Replays a fixed sequence of chunks
///
/// Used to drive sessions from recorded output.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    chunks: Vec<Result<String, TransportError>>,
    next: usize,
    reads: usize,
    closed: bool,
}

impl ReplaySource {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| Ok(c.into())).collect(),
            ..Self::default()
        }
    }

    /// Split text into chunks of at most `chunk_size` characters
    pub fn from_text(text: &str, chunk_size: usize) -> Self {
        let size = chunk_size.max(1);
        let chars: Vec<char> = text.chars().collect();
        Self::new(chars.chunks(size).map(|c| c.iter().collect::<String>()))
    }

    /// Fail with a transport error once the given chunks are consumed
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.chunks.push(Err(TransportError(message.into())));
        self
    }

    /// How many times `next_chunk` handed out an item
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl ChunkSource for ReplaySource {
    async fn next_chunk(&mut self) -> Option<Result<String, TransportError>> {
        if self.closed {
            return None;
        }
        let item = self.chunks.get(self.next).cloned()?;
        self.next += 1;
        self.reads += 1;
        Some(item)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
