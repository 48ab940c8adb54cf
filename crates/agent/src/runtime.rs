use std::sync::{Mutex, MutexGuard, PoisonError};

use bookbuddy_core::config::AppConfig;
use bookbuddy_core::domain::book::Recommendation;
use bookbuddy_core::errors::{ApplicationError, DomainError};
use bookbuddy_core::normalize::{parse_recommendations, ResponseNormalizer};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::conversation::{HistoryEntry, SessionStore};
use crate::instruction::{load_instruction, with_summary_request};
use crate::llm::{AgentClient, InvocationRequest};

pub const SELF_TEST_QUERY: &str = "Test: recommend one motivational book";
const SELF_TEST_SESSION: &str = "test-session";
const ERROR_PREFIX: &str = "❌ Error:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatReply {
    Answered { text: String, recommendations: Vec<Recommendation> },
    /// `text` is the user-facing `❌ Error: ...` line; nothing was recorded.
    Failed { text: String, error: ApplicationError },
}

impl ChatReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Answered { text, .. } | Self::Failed { text, .. } => text,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Only the user-safe message is shown; upstream details stay in `error` and the log.
    fn failed(error: ApplicationError, session_id: &str) -> Self {
        let interface = error.clone().into_interface(session_id);
        Self::Failed { text: format!("{ERROR_PREFIX} {}", interface.user_message()), error }
    }
}

pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4())
}

/// Sends queries to the agent, normalizes replies, and remembers answered turns.
pub struct AgentRuntime<C> {
    client: C,
    normalizer: ResponseNormalizer,
    instruction: String,
    agent_name: String,
    store: Mutex<SessionStore>,
}

impl<C: AgentClient> AgentRuntime<C> {
    pub fn new(client: C, normalizer: ResponseNormalizer, instruction: impl Into<String>) -> Self {
        Self {
            client,
            normalizer,
            instruction: instruction.into(),
            agent_name: "BookBuddy".to_string(),
            store: Mutex::new(SessionStore::default()),
        }
    }

    pub fn from_config(client: C, config: &AppConfig) -> Result<Self, ApplicationError> {
        let normalizer = ResponseNormalizer::new(config.normalizer.to_settings())?;
        let instruction = load_instruction(config.agent.instruction_path.as_deref())?;
        Ok(Self::new(client, normalizer, instruction)
            .with_agent_name(config.agent.name.clone())
            .with_max_turns(config.session.max_turns))
    }

    /// Caps the prior turns of each session sent back to the agent. Drops recorded turns.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.store = Mutex::new(SessionStore::new(max_turns));
        self
    }

    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn initialize(&self) -> Result<(), ApplicationError> {
        if let Err(error) = self.client.verify_model().await {
            warn!(
                event_name = "agent.model_unavailable",
                agent_name = %self.agent_name,
                model = self.client.model(),
                error = %error,
                "model access check failed"
            );
            return Err(error.into());
        }

        info!(
            event_name = "agent.initialized",
            agent_name = %self.agent_name,
            model = self.client.model(),
            "agent ready"
        );
        Ok(())
    }

    pub async fn chat(&self, session_id: &str, query: &str, include_summary: bool) -> ChatReply {
        match self.exchange(session_id, query, include_summary).await {
            Ok(text) => {
                let recommendations = parse_recommendations(&text);
                self.lock_store().record(HistoryEntry {
                    session_id: session_id.to_string(),
                    query: query.trim().to_string(),
                    response: text.clone(),
                    include_summary,
                    recorded_at: Utc::now(),
                });

                info!(
                    event_name = "agent.chat.answered",
                    session_id,
                    include_summary,
                    recommendation_count = recommendations.len(),
                    "chat turn answered"
                );
                ChatReply::Answered { text, recommendations }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.chat.failed",
                    session_id,
                    error = %error,
                    "chat turn failed"
                );
                ChatReply::failed(error, session_id)
            }
        }
    }

    /// Sends a canned query outside any user session and checks the reply looks like a
    /// recommendation.
    pub async fn self_test(&self) -> Result<String, ApplicationError> {
        let reply = self.exchange(SELF_TEST_SESSION, SELF_TEST_QUERY, false).await?;
        let lowered = reply.to_lowercase();
        if lowered.contains("book") || lowered.contains("recommend") {
            info!(event_name = "agent.self_test.passed", "agent self-test passed");
            Ok(reply)
        } else {
            let preview = reply.chars().take(200).collect::<String>();
            Err(ApplicationError::Integration(format!(
                "self-test reply did not mention a book: {preview}"
            )))
        }
    }

    /// The last `limit` answered queries across sessions, newest first.
    pub fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.lock_store().history().recent(limit)
    }

    async fn exchange(
        &self,
        session_id: &str,
        query: &str,
        include_summary: bool,
    ) -> Result<String, ApplicationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::EmptyQuery.into());
        }

        let input =
            if include_summary { with_summary_request(query) } else { query.to_string() };
        let request = InvocationRequest {
            session_id: session_id.to_string(),
            instruction: self.instruction.clone(),
            history: self.lock_store().turns(session_id),
            input,
        };

        let raw = self.client.invoke(&request).await?;
        Ok(self.normalizer.normalize(&raw))
    }

    fn lock_store(&self) -> MutexGuard<'_, SessionStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bookbuddy_core::config::AppConfig;
    use bookbuddy_core::errors::ApplicationError;
    use bookbuddy_core::normalize::ResponseNormalizer;

    use super::{AgentRuntime, ChatReply, SELF_TEST_QUERY};
    use crate::instruction::SUMMARY_INSTRUCTION;
    use crate::llm::{AgentClient, AgentError, InvocationRequest};

    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, AgentError>>>,
        requests: Mutex<Vec<InvocationRequest>>,
        model_available: bool,
    }

    impl ScriptedClient {
        fn replying(replies: Vec<Result<String, AgentError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
                model_available: true,
            }
        }

        fn requests(&self) -> Vec<InvocationRequest> {
            self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl AgentClient for ScriptedClient {
        async fn invoke(&self, request: &InvocationRequest) -> Result<String, AgentError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            self.replies
                .lock()
                .ok()
                .and_then(|mut replies| replies.pop_front())
                .unwrap_or(Err(AgentError::EmptyCompletion))
        }

        async fn verify_model(&self) -> Result<(), AgentError> {
            if self.model_available {
                Ok(())
            } else {
                Err(AgentError::ModelUnavailable {
                    model: "scripted".to_string(),
                    available: Vec::new(),
                })
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn runtime(client: ScriptedClient) -> AgentRuntime<ScriptedClient> {
        AgentRuntime::new(client, ResponseNormalizer::default(), "Recommend books.")
    }

    #[tokio::test]
    async fn chat_normalizes_and_records_the_turn() {
        let runtime = runtime(ScriptedClient::replying(vec![Ok(
            "Bot: **Atomic Habits** by James Clear - tiny changes".to_string(),
        )]));

        let reply = runtime.chat("s1", "habit books", false).await;

        let ChatReply::Answered { text, recommendations } = reply else {
            panic!("expected an answer");
        };
        assert_eq!(
            text,
            "📚 **Atomic Habits** by James Clear\ntiny changes\nBuy: https://amazon.com/s?k=Atomic+Habits+James+Clear"
        );
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].book.author, "James Clear");

        let history = runtime.recent_history(3);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "habit books");
        assert_eq!(history[0].response, text);
    }

    #[tokio::test]
    async fn failure_renders_error_line_and_records_nothing() {
        let runtime = runtime(ScriptedClient::replying(vec![Err(AgentError::Transport(
            "connection refused".to_string(),
        ))]));

        let reply = runtime.chat("s1", "anything", false).await;

        assert!(reply.is_failure());
        assert_eq!(
            reply.text(),
            "❌ Error: The book agent is temporarily unavailable. Please retry shortly."
        );
        assert!(runtime.recent_history(3).is_empty());
    }

    #[tokio::test]
    async fn upstream_error_body_stays_out_of_the_reply() {
        let runtime = runtime(ScriptedClient::replying(vec![Err(AgentError::Status {
            status: 500,
            body: "Traceback: db password=hunter2".to_string(),
        })]));

        let reply = runtime.chat("s1", "anything", false).await;

        assert!(reply.text().starts_with("❌ Error:"));
        assert!(!reply.text().contains("hunter2"));
        assert!(!reply.text().contains("500"));
        let ChatReply::Failed { error, .. } = reply else {
            panic!("expected a failure");
        };
        assert!(error.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn prior_turns_sent_per_session_are_capped() {
        let replies = (0..25).map(|n| Ok(format!("Reply {n} about a book"))).collect();
        let runtime = runtime(ScriptedClient::replying(replies)).with_max_turns(4);

        for n in 0..25 {
            let reply = runtime.chat("s1", &format!("query {n}"), false).await;
            assert!(!reply.is_failure());
        }

        let requests = runtime.client().requests();
        assert_eq!(requests.len(), 25);
        assert!(requests.iter().all(|request| request.history.len() <= 4));
        let last = &requests[24].history;
        assert_eq!(last.len(), 4);
        assert_eq!(last[0].query, "query 20");
        assert_eq!(last[3].query, "query 23");
        assert_eq!(runtime.recent_history(30).len(), 25);
    }

    #[tokio::test]
    async fn empty_query_fails_without_calling_the_agent() {
        let runtime = runtime(ScriptedClient::replying(Vec::new()));

        let reply = runtime.chat("s1", "   ", false).await;

        assert!(matches!(reply, ChatReply::Failed { error: ApplicationError::Domain(_), .. }));
        assert!(reply.text().starts_with("❌ Error:"));
        assert!(runtime.client().requests().is_empty());
    }

    #[tokio::test]
    async fn summary_requests_and_session_history_reach_the_agent() {
        let runtime = runtime(ScriptedClient::replying(vec![
            Ok("Try 📚 **Dune** by Frank Herbert".to_string()),
            Ok("Try 📚 **Hyperion** by Dan Simmons".to_string()),
            Ok("Try 📚 **Emma** by Jane Austen".to_string()),
        ]));

        runtime.chat("s1", "sci-fi", false).await;
        runtime.chat("s1", "more like that", true).await;
        runtime.chat("s2", "romance", false).await;

        let requests = runtime.client().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].input, "sci-fi");
        assert!(requests[0].history.is_empty());
        assert_eq!(requests[1].input, format!("more like that. {SUMMARY_INSTRUCTION}"));
        assert_eq!(requests[1].history.len(), 1);
        assert_eq!(requests[1].history[0].query, "sci-fi");
        assert!(requests[2].history.is_empty());
        assert!(requests.iter().all(|request| request.instruction == "Recommend books."));

        let recent = runtime.recent_history(2);
        assert_eq!(recent[0].query, "romance");
        assert_eq!(recent[1].query, "more like that");
        assert!(recent[1].include_summary);
    }

    #[tokio::test]
    async fn self_test_accepts_book_replies_and_skips_history() {
        let runtime = runtime(ScriptedClient::replying(vec![
            Ok("I recommend 📚 **Grit** by Angela Duckworth".to_string()),
            Ok("Hello there".to_string()),
        ]));

        assert!(runtime.self_test().await.is_ok());
        assert!(runtime.self_test().await.is_err());
        assert!(runtime.recent_history(3).is_empty());
        assert_eq!(runtime.client().requests()[0].input, SELF_TEST_QUERY);
    }

    #[tokio::test]
    async fn initialize_reports_missing_model() {
        let client = ScriptedClient { model_available: false, ..ScriptedClient::default() };
        let runtime = runtime(client);

        let error = runtime.initialize().await.err();
        assert!(matches!(
            error,
            Some(ApplicationError::Integration(ref message)) if message.contains("scripted")
        ));
    }

    #[test]
    fn from_config_uses_agent_name_and_normalizer_settings() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.agent.name = "ShelfHelper".to_string();

        config.session.max_turns = 2;

        let runtime = AgentRuntime::from_config(ScriptedClient::default(), &config)
            .map_err(|err| err.to_string())?;
        assert_eq!(runtime.agent_name(), "ShelfHelper");
        assert_eq!(runtime.lock_store().max_turns(), 2);
        Ok(())
    }
}
