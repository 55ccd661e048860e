//! Plan generation: prompt the model and stream its reply into a session

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::{CompletionRequest, LlmClient, Message, StreamChunk};
use crate::prompts;
use crate::session::{ChannelSource, SessionError, SessionState, SessionUpdate, StreamSession};
use crate::tree::TaskTree;

/// Builds plan requests and connects the model's stream to sessions
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
    channel_capacity: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, config: &Config) -> Self {
        debug!(model = %config.llm.model, "Planner::new: called");
        Self {
            llm,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            channel_capacity: config.stream.channel_capacity.max(1),
        }
    }

    /// Request for a fresh plan
    pub fn plan_request(&self, goal: &str) -> CompletionRequest {
        self.request(vec![Message::user(prompts::plan_request(goal))])
    }

    /// Request to rework an existing plan
    ///
    /// Replays the exchange that produced `current` so the model revises its
    /// own answer.
    pub fn revise_request(&self, goal: &str, current: &TaskTree, feedback: &str) -> CompletionRequest {
        self.request(vec![
            Message::user(prompts::plan_request(goal)),
            Message::assistant(current.to_document().to_string()),
            Message::user(prompts::revise_request(feedback)),
        ])
    }

    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            system_prompt: prompts::PLANNER_SYSTEM.to_string(),
            messages,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        }
    }

    /// Spawn the streaming call and return its chunks as a source
    ///
    /// A client error is forwarded as [`StreamChunk::Error`] so the session
    /// sees a transport failure instead of a normal end of stream.
    pub fn start(&self, request: CompletionRequest) -> ChannelSource {
        debug!(capacity = self.channel_capacity, "start: called");
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let llm = Arc::clone(&self.llm);

        let producer = tokio::spawn(async move {
            let err_tx = tx.clone();
            match llm.stream(request, tx).await {
                Ok(response) => {
                    debug!(stop_reason = ?response.stop_reason, usage = ?response.usage, "start: stream finished");
                }
                Err(e) => {
                    warn!(error = %e, "start: stream failed");
                    let _ = err_tx.send(StreamChunk::Error(e.to_string())).await;
                }
            }
        });

        ChannelSource::new(rx).with_producer(producer)
    }

    /// Stream a request into `session` until it completes, fails or is cancelled
    pub async fn run<F>(
        &self,
        request: CompletionRequest,
        session: &mut StreamSession,
        on_update: F,
    ) -> Result<SessionState, SessionError>
    where
        F: FnMut(&SessionUpdate<'_>),
    {
        let mut source = self.start(request);
        session.run(&mut source, on_update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::llm::client::mock::MockLlmClient;
    use crate::session::TransportError;
    use crate::tree::NodeId;

    fn planner(client: Arc<MockLlmClient>) -> Planner {
        Planner::new(client, &Config::default())
    }

    #[tokio::test]
    async fn test_run_streams_plan_into_tree() {
        let client = Arc::new(MockLlmClient::new(vec![
            "```json\n{\"steps\": [{\"title\": \"Pick a ",
            "neighbourhood\", \"steps\": [{\"title\": \"Visit\"}]}, ",
            "{\"title\": \"\"}]}\n```",
        ]));
        let planner = planner(Arc::clone(&client));
        let mut session = StreamSession::new();
        let mut titles_seen = Vec::new();

        let state = planner
            .run(planner.plan_request("move to Lisbon"), &mut session, |update| {
                if let Some(node) = update.tree.get(&NodeId::root(0)) {
                    titles_seen.push(node.title().to_string());
                }
            })
            .await
            .unwrap();

        assert_eq!(state, SessionState::Completed);
        assert_eq!(titles_seen.first().map(String::as_str), Some("Pick a "));
        assert_eq!(session.tree().counts().total, 2);
        assert_eq!(client.call_count(), 1);

        let request = client.last_request().unwrap();
        assert_eq!(request.system_prompt, prompts::PLANNER_SYSTEM);
        assert_eq!(request.messages[0].content, "Goal: move to Lisbon");
    }

    #[tokio::test]
    async fn test_run_client_error_fails_session() {
        let client = Arc::new(MockLlmClient::new(vec!["{\"steps\": [{\"title\": \"A\"}", ", "]).failing_after(1));
        let planner = planner(client);
        let mut session = StreamSession::new();

        let result = planner.run(planner.plan_request("x"), &mut session, |_| {}).await;

        assert!(matches!(result, Err(SessionError::Transport(TransportError(_)))));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.tree().len(), 1);
    }

    #[test]
    fn test_revise_request_carries_current_plan() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let planner = planner(client);
        let tree = crate::tree::reconcile_final(
            &TaskTree::new(),
            &serde_json::json!({"steps": [{"title": "Buy a boat"}]}),
        );

        let request = planner.revise_request("learn to sail", &tree, "cheaper");
        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.messages[0].content, "Goal: learn to sail");
        assert!(request.messages[1].content.contains(r#""title":"Buy a boat""#));
        assert!(request.messages[2].content.ends_with("cheaper"));
        assert_eq!(request.max_tokens, 4096);
    }
}
