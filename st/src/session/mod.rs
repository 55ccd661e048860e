//! One generation request from first chunk to final tree
//!
//! A [`StreamSession`] owns the raw buffer and the tree for a single request.
//! Each chunk is appended, the whole buffer is repaired, and the snapshot is
//! reconciled into the tree before the next chunk is looked at. The session
//! ends in exactly one of three ways: the stream completes (final reconcile),
//! the transport fails, or the session's cancellation token fires.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod buffer;
mod source;

pub use buffer::RawBuffer;
pub use source::{ChannelSource, ChunkSource, ReplaySource, TransportError};

use crate::tree::{NodeId, ReconcileMode, ReconcileOutcome, TaskCounts, TaskTree, TreeError};

/// Errors from session operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Session is no longer streaming (state: {0})")]
    Closed(SessionState),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Streaming)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the caller re-renders from after each chunk
#[derive(Debug, Clone, Copy)]
pub struct SessionUpdate<'a> {
    /// Raw text received so far
    pub content: &'a str,
    /// True for the update produced by the final reconcile
    pub done: bool,
    /// Tree after this update
    pub tree: &'a TaskTree,
    /// What the reconcile did
    pub outcome: ReconcileOutcome,
}

impl SessionUpdate<'_> {
    pub fn counts(&self) -> TaskCounts {
        self.tree.counts()
    }
}

/// State for one streamed generation request
#[derive(Debug)]
pub struct StreamSession {
    buffer: RawBuffer,
    tree: TaskTree,
    state: SessionState,
    cancel: CancellationToken,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        debug!("StreamSession::new: called");
        Self {
            buffer: RawBuffer::new(),
            tree: TaskTree::new(),
            state: SessionState::Streaming,
            cancel: CancellationToken::new(),
        }
    }

    /// Start over for a new request: empty buffer, empty tree, fresh token
    ///
    /// The previous token is cancelled so any consumer still holding it stops.
    pub fn restart(&mut self) {
        debug!(state = %self.state, "restart: called");
        self.cancel.cancel();
        *self = Self::new();
    }

    /// Token that cancels this session; clone it into whatever may cancel
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the session; the next chunk event becomes a no-op
    pub fn cancel(&mut self) {
        debug!(state = %self.state, "cancel: called");
        self.cancel.cancel();
        self.observe_cancel();
    }

    /// True while chunks are still being applied
    pub fn is_live(&self) -> bool {
        self.state == SessionState::Streaming && !self.cancel.is_cancelled()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tree(&self) -> &TaskTree {
        &self.tree
    }

    pub fn into_tree(self) -> TaskTree {
        self.tree
    }

    /// Raw text received so far
    pub fn content(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn buffer(&self) -> &RawBuffer {
        &self.buffer
    }

    /// Toggle a task's completion; allowed during and after streaming
    pub fn set_completed(&mut self, id: &NodeId, completed: bool) -> Result<(), SessionError> {
        self.tree.set_completed(id, completed)?;
        Ok(())
    }

    /// Apply one chunk
    ///
    /// Returns `Ok(None)` without touching anything once the session has been
    /// cancelled. The token is read here, at processing time, so a chunk that
    /// arrives after cancellation is ignored even if it was already in flight.
    pub fn handle_chunk(&mut self, chunk: &str) -> Result<Option<SessionUpdate<'_>>, SessionError> {
        if self.observe_cancel() {
            debug!("handle_chunk: session cancelled, ignoring chunk");
            return Ok(None);
        }
        if self.state.is_terminal() {
            return Err(SessionError::Closed(self.state));
        }

        self.buffer.push(chunk);
        let doc = jsonmend::repair(self.buffer.as_str());
        let outcome = self.tree.reconcile(&doc, ReconcileMode::Intermediate);
        debug!(
            chunks = self.buffer.chunk_count(),
            bytes = self.buffer.len(),
            ?outcome,
            "handle_chunk: reconciled"
        );

        Ok(Some(SessionUpdate {
            content: self.buffer.as_str(),
            done: false,
            tree: &self.tree,
            outcome,
        }))
    }

    /// The stream completed: run the final reconcile and prune
    pub fn finish(&mut self) -> Result<SessionUpdate<'_>, SessionError> {
        self.observe_cancel();
        if self.state.is_terminal() {
            return Err(SessionError::Closed(self.state));
        }

        let doc = jsonmend::repair(self.buffer.as_str());
        let outcome = self.tree.reconcile(&doc, ReconcileMode::Final);
        self.state = SessionState::Completed;

        let counts = self.tree.counts();
        info!(
            chunks = self.buffer.chunk_count(),
            tasks = counts.total,
            ?outcome,
            "finish: session completed"
        );

        Ok(SessionUpdate {
            content: self.buffer.as_str(),
            done: true,
            tree: &self.tree,
            outcome,
        })
    }

    /// The transport failed; the tree keeps whatever it had
    pub fn fail(&mut self, error: &TransportError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(%error, chunks = self.buffer.chunk_count(), "fail: transport error");
        self.state = SessionState::Failed;
    }

    /// Drive the session from a chunk source until it ends
    ///
    /// `on_update` runs after every applied chunk and once more after the
    /// final reconcile. Cancelling the token (from `on_update` or anywhere
    /// else) stops reading: the source is closed and no further chunk is
    /// requested.
    pub async fn run<S, F>(&mut self, source: &mut S, mut on_update: F) -> Result<SessionState, SessionError>
    where
        S: ChunkSource + ?Sized,
        F: FnMut(&SessionUpdate<'_>),
    {
        debug!("run: called");
        if self.state.is_terminal() {
            return Err(SessionError::Closed(self.state));
        }

        loop {
            if self.observe_cancel() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Next::Cancelled,
                item = source.next_chunk() => Next::Item(item),
            };

            match next {
                Next::Cancelled => break,
                Next::Item(None) => {
                    let update = self.finish()?;
                    on_update(&update);
                    return Ok(SessionState::Completed);
                }
                Next::Item(Some(Ok(chunk))) => {
                    if let Some(update) = self.handle_chunk(&chunk)? {
                        on_update(&update);
                    }
                }
                Next::Item(Some(Err(error))) => {
                    self.fail(&error);
                    source.close().await;
                    return Err(SessionError::Transport(error));
                }
            }
        }

        info!(chunks = self.buffer.chunk_count(), "run: session cancelled");
        self.observe_cancel();
        source.close().await;
        Ok(SessionState::Cancelled)
    }

    /// Move to `Cancelled` if the token has fired; true when cancelled
    fn observe_cancel(&mut self) -> bool {
        if self.cancel.is_cancelled() && self.state == SessionState::Streaming {
            self.state = SessionState::Cancelled;
        }
        self.state == SessionState::Cancelled
    }
}

enum Next {
    Cancelled,
    Item(Option<Result<String, TransportError>>),
}
