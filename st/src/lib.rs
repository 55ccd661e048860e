//! stepstream - live task trees from a streamed plan
//!
//! A model asked to plan a goal replies with `{"steps": [{"title", "steps"}]}`
//! one token at a time. [`session::StreamSession`] repairs the partial reply
//! after every chunk (with [`jsonmend`]) and reconciles it into a
//! [`tree::TaskTree`] whose nodes keep their identity and their user-set
//! completion while titles keep growing.

pub mod cli;
pub mod config;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod render;
pub mod session;
pub mod tree;

pub use config::Config;
pub use planner::Planner;
pub use session::{ChunkSource, ReplaySource, SessionError, SessionState, SessionUpdate, StreamSession};
pub use tree::{NodeId, ReconcileMode, TaskCounts, TaskNode, TaskTree};
