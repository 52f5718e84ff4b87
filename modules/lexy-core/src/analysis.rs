use std::mem;
use std::sync::Arc;

use lexy_common::{ChatMessage, Post, PromptRequest};
use tracing::{info, warn};

use crate::backend::LexyBackend;
use crate::credits::CreditGate;
use crate::error::{AnalysisError, BackendError, TransitionError};
use crate::markup::Document;
use crate::prompts::{chat_user_prompt, summary_user_prompt, CHAT_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT};

const SIGN_IN_SUMMARY: &str = "Please sign in to generate an AI analysis.";
const FAILED_SUMMARY: &str = "Sorry, the analysis could not be generated right now. Please try again.";
const FAILED_REPLY: &str = "Sorry, I couldn't get a response. Please try again.";

/// Where the analysis panel is. Chat history survives a trip back to the
/// summary and is dropped only by a new analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnalysisState {
    #[default]
    NoAnalysis,
    Generating,
    SummaryShown {
        summary: String,
        chat: Vec<ChatMessage>,
    },
    ChatMode {
        summary: String,
        messages: Vec<ChatMessage>,
        awaiting_reply: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    Generate,
    SummaryReady(String),
    ContinueInChat,
    BackToSummary,
    UserSent(ChatMessage),
    ReplyReceived(ChatMessage),
    NewAnalysis,
}

impl AnalysisEvent {
    fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Generate => "generate a summary",
            AnalysisEvent::SummaryReady(_) => "show a summary",
            AnalysisEvent::ContinueInChat => "continue in chat",
            AnalysisEvent::BackToSummary => "go back to the summary",
            AnalysisEvent::UserSent(_) => "send a message",
            AnalysisEvent::ReplyReceived(_) => "receive a reply",
            AnalysisEvent::NewAnalysis => "start a new analysis",
        }
    }
}

impl AnalysisState {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisState::NoAnalysis => "no analysis",
            AnalysisState::Generating => "generating",
            AnalysisState::SummaryShown { .. } => "showing the summary",
            AnalysisState::ChatMode {
                awaiting_reply: true,
                ..
            } => "awaiting a reply",
            AnalysisState::ChatMode { .. } => "chatting",
        }
    }

    /// The single transition function. On error the state is unchanged.
    pub fn apply(&mut self, event: AnalysisEvent) -> Result<(), TransitionError> {
        match Self::transition(mem::take(self), event) {
            Ok(next) => {
                *self = next;
                Ok(())
            }
            Err((previous, err)) => {
                *self = previous;
                Err(err)
            }
        }
    }

    fn transition(state: Self, event: AnalysisEvent) -> Result<Self, (Self, TransitionError)> {
        use AnalysisEvent as E;
        use AnalysisState as S;

        match (state, event) {
            (S::NoAnalysis, E::Generate) => Ok(S::Generating),
            (S::Generating, E::SummaryReady(summary)) => Ok(S::SummaryShown {
                summary,
                chat: Vec::new(),
            }),
            (S::SummaryShown { summary, chat }, E::ContinueInChat) => {
                let messages = if chat.is_empty() {
                    vec![ChatMessage::ai(summary.clone())]
                } else {
                    chat
                };
                Ok(S::ChatMode {
                    summary,
                    messages,
                    awaiting_reply: false,
                })
            }
            (
                S::ChatMode {
                    summary,
                    messages,
                    awaiting_reply: false,
                },
                E::BackToSummary,
            ) => Ok(S::SummaryShown {
                summary,
                chat: messages,
            }),
            (
                S::ChatMode {
                    summary,
                    mut messages,
                    awaiting_reply: false,
                },
                E::UserSent(message),
            ) => {
                messages.push(message);
                Ok(S::ChatMode {
                    summary,
                    messages,
                    awaiting_reply: true,
                })
            }
            (
                S::ChatMode {
                    summary,
                    mut messages,
                    awaiting_reply: true,
                },
                E::ReplyReceived(message),
            ) => {
                messages.push(message);
                Ok(S::ChatMode {
                    summary,
                    messages,
                    awaiting_reply: false,
                })
            }
            (_, E::NewAnalysis) => Ok(S::NoAnalysis),
            (state, event) => {
                let err = TransitionError {
                    state: state.name(),
                    action: event.name(),
                };
                Err((state, err))
            }
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            AnalysisState::SummaryShown { summary, .. } | AnalysisState::ChatMode { summary, .. } => {
                Some(summary)
            }
            _ => None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        match self {
            AnalysisState::SummaryShown { chat, .. } => chat,
            AnalysisState::ChatMode { messages, .. } => messages,
            _ => &[],
        }
    }
}

/// Runs a summary and follow-up chat over the currently loaded results.
pub struct AnalysisOrchestrator {
    backend: Arc<dyn LexyBackend>,
    gate: Arc<CreditGate>,
    sources: Vec<Post>,
    state: AnalysisState,
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn LexyBackend>, gate: Arc<CreditGate>, sources: Vec<Post>) -> Self {
        Self {
            backend,
            gate,
            sources,
            state: AnalysisState::NoAnalysis,
        }
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn sources(&self) -> &[Post] {
        &self.sources
    }

    /// A new result set discards any analysis of the previous one.
    pub fn set_sources(&mut self, sources: Vec<Post>) {
        self.sources = sources;
        self.state = AnalysisState::NoAnalysis;
    }

    pub fn summary(&self) -> Option<&str> {
        self.state.summary()
    }

    pub fn summary_document(&self) -> Option<Document> {
        self.summary().map(Document::parse)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    /// Failures after the preconditions never surface as errors: the summary
    /// slot holds a readable error message instead.
    pub async fn generate_summary(&mut self, prompt_override: Option<&str>) -> Result<(), AnalysisError> {
        self.gate.check()?;
        let email = self.gate.require_email()?;
        self.state.apply(AnalysisEvent::Generate)?;

        let req = PromptRequest {
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
            user_prompt: summary_user_prompt(&self.sources, prompt_override),
            email,
        };

        let summary = match self.backend.prompt(&req).await {
            Ok(resp) => {
                info!(sources = self.sources.len(), chars = resp.output.len(), "Summary generated");
                self.gate.consume().await;
                resp.output
            }
            Err(BackendError::SignInRequired) => {
                warn!("Summary rejected: sign-in required");
                SIGN_IN_SUMMARY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Summary generation failed");
                FAILED_SUMMARY.to_string()
            }
        };

        self.state.apply(AnalysisEvent::SummaryReady(summary))?;
        Ok(())
    }

    pub fn continue_in_chat(&mut self) -> Result<(), AnalysisError> {
        Ok(self.state.apply(AnalysisEvent::ContinueInChat)?)
    }

    pub fn back_to_summary(&mut self) -> Result<(), AnalysisError> {
        Ok(self.state.apply(AnalysisEvent::BackToSummary)?)
    }

    pub fn new_analysis(&mut self) -> Result<(), AnalysisError> {
        Ok(self.state.apply(AnalysisEvent::NewAnalysis)?)
    }

    /// Appends the user message at once, then the reply (or an error
    /// message) when the completion returns.
    pub async fn send_message(&mut self, text: &str) -> Result<(), AnalysisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::EmptyMessage);
        }
        self.gate.check()?;
        let email = self.gate.require_email()?;

        let history = self.state.messages().to_vec();
        self.state.apply(AnalysisEvent::UserSent(ChatMessage::user(text)))?;

        let req = PromptRequest {
            system_prompt: CHAT_SYSTEM_PROMPT.to_string(),
            user_prompt: chat_user_prompt(&history, &self.sources, text),
            email,
        };

        let reply = match self.backend.prompt(&req).await {
            Ok(resp) => {
                self.gate.consume().await;
                resp.output
            }
            Err(e) => {
                warn!(error = %e, "Chat reply failed");
                FAILED_REPLY.to_string()
            }
        };

        self.state.apply(AnalysisEvent::ReplyReceived(ChatMessage::ai(reply)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::account::MemoryAccountStore;
    use crate::error::GateDenial;
    use crate::identity::Identity;
    use crate::store::LocalStore;
    use crate::testing::{sample_posts, MockBackend, RecordingNotifier};
    use lexy_common::{CreditAccount, Membership, Sender};

    async fn orchestrator(
        backend: Arc<MockBackend>,
        identity: Identity,
        credits: i64,
        sources: Vec<Post>,
    ) -> (AnalysisOrchestrator, Arc<MemoryAccountStore>) {
        let accounts = Arc::new(
            MemoryAccountStore::default()
                .with_account("a@b.c", CreditAccount::new(credits, Membership::Free)),
        );
        let gate = CreditGate::connect(
            identity,
            accounts.clone(),
            LocalStore::in_memory(),
            credits,
            Arc::new(RecordingNotifier::default()),
        )
        .await
        .unwrap();
        (
            AnalysisOrchestrator::new(backend, Arc::new(gate), sources),
            accounts,
        )
    }

    fn user() -> Identity {
        Identity::from_email(Some("a@b.c"))
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let mut state = AnalysisState::NoAnalysis;
        let err = state.apply(AnalysisEvent::ContinueInChat).unwrap_err();
        assert_eq!(err.state, "no analysis");
        assert_eq!(state, AnalysisState::NoAnalysis);
    }

    #[test]
    fn chat_round_trip_keeps_history() {
        let mut state = AnalysisState::NoAnalysis;
        state.apply(AnalysisEvent::Generate).unwrap();
        state.apply(AnalysisEvent::SummaryReady("S".into())).unwrap();
        state.apply(AnalysisEvent::ContinueInChat).unwrap();
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].sender, Sender::Ai);

        state.apply(AnalysisEvent::UserSent(ChatMessage::user("q"))).unwrap();
        assert!(state.apply(AnalysisEvent::BackToSummary).is_err());
        assert!(state.apply(AnalysisEvent::UserSent(ChatMessage::user("q2"))).is_err());
        state.apply(AnalysisEvent::ReplyReceived(ChatMessage::ai("a"))).unwrap();

        state.apply(AnalysisEvent::BackToSummary).unwrap();
        assert_eq!(state.summary(), Some("S"));
        state.apply(AnalysisEvent::ContinueInChat).unwrap();
        assert_eq!(state.messages().len(), 3);

        state.apply(AnalysisEvent::NewAnalysis).unwrap();
        assert_eq!(state, AnalysisState::NoAnalysis);
    }

    #[test]
    fn new_analysis_abandons_generation_and_drops_late_summary() {
        let mut state = AnalysisState::Generating;
        state.apply(AnalysisEvent::NewAnalysis).unwrap();
        assert_eq!(state, AnalysisState::NoAnalysis);

        assert!(state.apply(AnalysisEvent::SummaryReady("late".into())).is_err());
        assert_eq!(state, AnalysisState::NoAnalysis);
    }

    #[tokio::test]
    async fn cancelled_generation_can_be_restarted() {
        let backend = Arc::new(
            MockBackend::new()
                .on_prompt_after(Duration::from_millis(500), "<p>Too late</p>")
                .on_prompt("<p>Fresh</p>"),
        );
        let (mut orch, accounts) = orchestrator(backend, user(), 3, sample_posts(2)).await;

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), orch.generate_summary(None)).await;
        assert!(cancelled.is_err());
        assert_eq!(orch.state(), &AnalysisState::Generating);

        orch.new_analysis().unwrap();
        assert_eq!(orch.state(), &AnalysisState::NoAnalysis);

        orch.generate_summary(None).await.unwrap();
        assert_eq!(orch.summary(), Some("<p>Fresh</p>"));
        assert_eq!(accounts.account("a@b.c").credits, 2);
    }

    #[tokio::test]
    async fn summary_is_stored_verbatim_and_charged() {
        let backend = Arc::new(MockBackend::new().on_prompt("<p>Hi <a href=\"u\">[1]</a></p>"));
        let (mut orch, accounts) = orchestrator(backend.clone(), user(), 3, sample_posts(2)).await;

        orch.generate_summary(None).await.unwrap();
        assert_eq!(orch.summary(), Some("<p>Hi <a href=\"u\">[1]</a></p>"));
        assert_eq!(orch.summary_document().unwrap().citations().len(), 1);
        assert_eq!(accounts.account("a@b.c").credits, 2);

        let prompts = backend.prompts();
        assert_eq!(prompts[0].system_prompt, SUMMARY_SYSTEM_PROMPT);
        assert!(prompts[0].user_prompt.contains("Sources (2):"));
        assert_eq!(prompts[0].email, "a@b.c");
    }

    #[tokio::test]
    async fn anonymous_caller_is_refused_without_network() {
        let backend = Arc::new(MockBackend::new().on_prompt("x"));
        let (mut orch, _) = orchestrator(backend.clone(), Identity::Anonymous, 3, vec![]).await;

        let err = orch.generate_summary(None).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Denied(GateDenial::SignInRequired)));
        assert_eq!(backend.call_count(), 0);
        assert_eq!(orch.state(), &AnalysisState::NoAnalysis);
    }

    #[tokio::test]
    async fn backend_failure_becomes_readable_summary() {
        let backend = Arc::new(
            MockBackend::new().on_prompt_error(BackendError::Network("reset".into())),
        );
        let (mut orch, accounts) = orchestrator(backend, user(), 3, vec![]).await;

        orch.generate_summary(None).await.unwrap();
        assert_eq!(orch.summary(), Some(FAILED_SUMMARY));
        assert_eq!(accounts.account("a@b.c").credits, 3);
    }

    #[tokio::test]
    async fn forbidden_becomes_sign_in_summary() {
        let backend = Arc::new(MockBackend::new().on_prompt_error(BackendError::SignInRequired));
        let (mut orch, _) = orchestrator(backend, user(), 3, vec![]).await;

        orch.generate_summary(None).await.unwrap();
        assert_eq!(orch.summary(), Some(SIGN_IN_SUMMARY));
    }

    #[tokio::test]
    async fn follow_up_resends_transcript_and_sources() {
        let backend = Arc::new(
            MockBackend::new()
                .on_prompt("Summary text")
                .on_prompt("Because [1].")
                .on_prompt_error(BackendError::Network("down".into())),
        );
        let (mut orch, _) = orchestrator(backend.clone(), user(), 10, sample_posts(1)).await;

        orch.generate_summary(None).await.unwrap();
        orch.continue_in_chat().unwrap();
        orch.send_message("Why?").await.unwrap();

        let contents: Vec<_> = orch.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Summary text", "Why?", "Because [1]."]);

        let follow_up = &backend.prompts()[1];
        assert_eq!(follow_up.system_prompt, CHAT_SYSTEM_PROMPT);
        assert!(follow_up.user_prompt.contains("Assistant: Summary text"));
        assert!(follow_up.user_prompt.contains("[1] Post 1"));
        assert!(follow_up.user_prompt.ends_with("Latest question: Why?"));

        orch.send_message("And?").await.unwrap();
        assert_eq!(orch.messages().last().unwrap().content, FAILED_REPLY);
        assert_eq!(orch.messages().len(), 5);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let backend = Arc::new(MockBackend::new());
        let (mut orch, _) = orchestrator(backend.clone(), user(), 3, vec![]).await;
        assert!(matches!(
            orch.send_message("   ").await,
            Err(AnalysisError::EmptyMessage)
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn sending_outside_chat_makes_no_call() {
        let backend = Arc::new(MockBackend::new());
        let (mut orch, _) = orchestrator(backend.clone(), user(), 3, vec![]).await;
        assert!(matches!(
            orch.send_message("hi").await,
            Err(AnalysisError::Transition(_))
        ));
        assert_eq!(backend.call_count(), 0);
    }
}
